use std::collections::HashMap;

use tracing::debug;

use crate::daemon::storage::activity_event::{ActivityEvent, ClickSource, Side};

use super::parser::{Edge, InputEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mouse,
    Touchpad,
    Keyboard,
    Unknown,
}

impl DeviceClass {
    /// Infers the class from the free text device description.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("touchpad") || lower.contains("trackpad") {
            DeviceClass::Touchpad
        } else if lower.contains("keyboard") {
            DeviceClass::Keyboard
        } else if ["mouse", "trackball", "trackpoint"]
            .iter()
            .any(|v| lower.contains(v))
        {
            DeviceClass::Mouse
        } else {
            DeviceClass::Unknown
        }
    }

    /// Only touchpads get their own counters, everything else counts as a mouse.
    pub fn click_source(&self) -> ClickSource {
        match self {
            DeviceClass::Touchpad => ClickSource::Touchpad,
            _ => ClickSource::Mouse,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PressState {
    pub left_down: bool,
    pub right_down: bool,
}

impl PressState {
    pub fn is_down(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_down,
            Side::Right => self.right_down,
        }
    }

    fn set(&mut self, side: Side, down: bool) {
        match side {
            Side::Left => self.left_down = down,
            Side::Right => self.right_down = down,
        }
    }
}

/// Per device classification and button state. Lives only in memory, so classification is
/// rebuilt from fresh `DEVICE_ADDED` lines after a restart.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    classes: HashMap<String, DeviceClass>,
    presses: HashMap<String, PressState>,
}

impl DeviceRegistry {
    pub fn class_of(&self, device_id: &str) -> DeviceClass {
        self.classes
            .get(device_id)
            .copied()
            .unwrap_or(DeviceClass::Unknown)
    }

    pub fn press_state(&self, device_id: &str) -> PressState {
        self.presses.get(device_id).copied().unwrap_or_default()
    }

    /// Folds a parsed event into the registry and returns the logical activity it stands for,
    /// if any.
    ///
    /// A press is always a click. A release is a click only when no press was seen for that
    /// button on that device, which covers streams starting in the middle of a gesture without
    /// counting the usual press/release pair twice.
    pub fn resolve(&mut self, event: InputEvent) -> Option<ActivityEvent> {
        match event {
            InputEvent::DeviceAdded {
                device_id,
                description,
            } => {
                let class = DeviceClass::classify(&description);
                debug!("Device {device_id} added as {class:?}");
                self.classes.insert(device_id, class);
                None
            }
            InputEvent::DeviceRemoved { device_id } => {
                debug!("Device {device_id} removed");
                self.classes.remove(&device_id);
                self.presses.remove(&device_id);
                None
            }
            InputEvent::PointerButton {
                device_id,
                button,
                edge,
            } => {
                let source = self.class_of(&device_id).click_source();
                let pressed = self.presses.entry(device_id).or_default();
                let counted = match edge {
                    Edge::Pressed => true,
                    Edge::Released => !pressed.is_down(button),
                };
                pressed.set(button, edge == Edge::Pressed);
                counted.then_some(ActivityEvent::Click {
                    side: button,
                    source,
                })
            }
            InputEvent::Tap { button, .. } => Some(ActivityEvent::Click {
                side: button,
                source: ClickSource::Touchpad,
            }),
            InputEvent::Key { key, .. } => Some(ActivityEvent::Key { name: key }),
            InputEvent::Scroll {
                vertical,
                horizontal,
            } => Some(ActivityEvent::Scroll {
                vertical,
                horizontal,
            }),
        }
    }
}
