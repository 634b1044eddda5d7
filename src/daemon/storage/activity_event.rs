use std::fmt::Display;

use crate::pointer_api::{PointerPosition, ScreenBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Which sub-counter a click is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickSource {
    Mouse,
    Touchpad,
}

/// Logical activity forwarded to the processing module. Each variant maps onto exactly one
/// reducer of [AggregateState](super::entities::AggregateState).
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    Click {
        side: Side,
        source: ClickSource,
    },
    Key {
        name: String,
    },
    Scroll {
        vertical: Option<f64>,
        horizontal: Option<f64>,
    },
    /// Pointer location sampled at the moment a click was seen.
    ClickPosition {
        side: Side,
        position: PointerPosition,
        bounds: ScreenBounds,
    },
    Travel {
        distance_px: f64,
    },
    ScreenSize(ScreenBounds),
}
