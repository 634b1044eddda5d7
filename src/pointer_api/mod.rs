//! Contains logic for querying the pointer and the monitor layout in different environments.
//! [GenericPointerApi] is the main artifact of this module that abstracts the operations.

pub mod hyprland;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Absolute pointer coordinates in the compositor's global space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn distance_to(&self, other: &PointerPosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Rectangle in the compositor's global space. Width and height are never 0 when produced by
/// [ScreenBounds::union].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenBounds {
    /// Smallest rectangle containing every monitor. `None` if there are no monitors.
    pub fn union(monitors: impl IntoIterator<Item = ScreenBounds>) -> Option<ScreenBounds> {
        let mut monitors = monitors.into_iter();
        let first = monitors.next()?;
        let (mut min_x, mut min_y) = (first.x as i64, first.y as i64);
        let mut max_x = first.x as i64 + first.width as i64;
        let mut max_y = first.y as i64 + first.height as i64;
        for monitor in monitors {
            min_x = min_x.min(monitor.x as i64);
            min_y = min_y.min(monitor.y as i64);
            max_x = max_x.max(monitor.x as i64 + monitor.width as i64);
            max_y = max_y.max(monitor.y as i64 + monitor.height as i64);
        }
        Some(ScreenBounds {
            x: min_x as i32,
            y: min_y as i32,
            width: (max_x - min_x).clamp(1, u32::MAX as i64) as u32,
            height: (max_y - min_y).clamp(1, u32::MAX as i64) as u32,
        })
    }
}

/// Contract every pointer backend implements. An `Err` means the value is unavailable right
/// now, which is distinct from a valid position at (0, 0).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointerApi: Send {
    async fn cursor_position(&mut self) -> Result<PointerPosition>;

    /// Union of all monitor rectangles.
    async fn screen_bounds(&mut self) -> Result<ScreenBounds>;
}

/// Serves as a cross-compatible PointerApi implementation. Backends are asked in order and the
/// first answer wins, so the compositor specific backend comes first.
pub struct GenericPointerApi {
    backends: Vec<Box<dyn PointerApi>>,
}

impl GenericPointerApi {
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut backends: Vec<Box<dyn PointerApi>> =
            vec![Box::new(hyprland::HyprlandPointerApi::default())];

        cfg_if::cfg_if! {
            if #[cfg(feature = "x11")] {
                match x11::X11PointerApi::new() {
                    Ok(backend) => backends.push(Box::new(backend)),
                    Err(e) => tracing::warn!("X11 pointer backend is unavailable {e:?}"),
                }
            }
        }

        Self { backends }
    }

    pub fn with_backends(backends: Vec<Box<dyn PointerApi>>) -> Self {
        Self { backends }
    }
}

impl Default for GenericPointerApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PointerApi for GenericPointerApi {
    async fn cursor_position(&mut self) -> Result<PointerPosition> {
        let mut last_error = anyhow!("No pointer backend configured");
        for backend in self.backends.iter_mut() {
            match backend.cursor_position().await {
                Ok(position) => return Ok(position),
                Err(e) => {
                    trace!("Pointer backend failed to provide position {e:?}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn screen_bounds(&mut self) -> Result<ScreenBounds> {
        let mut last_error = anyhow!("No pointer backend configured");
        for backend in self.backends.iter_mut() {
            match backend.screen_bounds().await {
                Ok(bounds) => return Ok(bounds),
                Err(e) => {
                    trace!("Pointer backend failed to provide bounds {e:?}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};

    use super::{GenericPointerApi, MockPointerApi, PointerApi, PointerPosition, ScreenBounds};

    #[test]
    fn test_union_of_side_by_side_monitors() {
        let bounds = ScreenBounds::union([
            ScreenBounds {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
            ScreenBounds {
                x: 1920,
                y: -200,
                width: 1280,
                height: 1024,
            },
        ]);
        assert_eq!(
            bounds,
            Some(ScreenBounds {
                x: 0,
                y: -200,
                width: 3200,
                height: 1280
            })
        );
    }

    #[test]
    fn test_union_of_nothing() {
        assert_eq!(ScreenBounds::union([]), None);
    }

    #[test]
    fn test_union_never_collapses_to_zero() {
        let bounds = ScreenBounds::union([ScreenBounds {
            x: 5,
            y: 5,
            width: 0,
            height: 0,
        }]);
        assert_eq!(
            bounds,
            Some(ScreenBounds {
                x: 5,
                y: 5,
                width: 1,
                height: 1
            })
        );
    }

    #[tokio::test]
    async fn test_generic_falls_back_to_next_backend() -> Result<()> {
        let mut failing = MockPointerApi::new();
        failing
            .expect_cursor_position()
            .returning(|| Err(anyhow!("not running under hyprland")));
        let mut working = MockPointerApi::new();
        working
            .expect_cursor_position()
            .returning(|| Ok(PointerPosition { x: 0., y: 0. }));

        let mut api = GenericPointerApi::with_backends(vec![Box::new(failing), Box::new(working)]);

        assert_eq!(api.cursor_position().await?, PointerPosition { x: 0., y: 0. });
        Ok(())
    }

    #[tokio::test]
    async fn test_generic_reports_unavailable() {
        let mut failing = MockPointerApi::new();
        failing
            .expect_screen_bounds()
            .returning(|| Err(anyhow!("no display")));
        let mut api = GenericPointerApi::with_backends(vec![Box::new(failing)]);

        assert!(api.screen_bounds().await.is_err());
    }
}
