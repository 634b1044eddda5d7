use std::{process::Stdio, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::instrument;

use super::{PointerApi, PointerPosition, ScreenBounds};

const HYPRCTL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Deserialize)]
struct HyprCursor {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct HyprMonitor {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    transform: u8,
}

fn default_scale() -> f64 {
    1.
}

impl HyprMonitor {
    /// Monitor rectangle in layout coordinates, the space `cursorpos` reports in.
    fn logical_bounds(&self) -> ScreenBounds {
        let scale = if self.scale.is_finite() && self.scale > 0. {
            self.scale
        } else {
            1.
        };
        let width = (self.width as f64 / scale).round() as u32;
        let height = (self.height as f64 / scale).round() as u32;
        // Odd transforms rotate the output by 90 or 270 degrees.
        let (width, height) = if self.transform % 2 == 1 {
            (height, width)
        } else {
            (width, height)
        };
        ScreenBounds {
            x: self.x,
            y: self.y,
            width,
            height,
        }
    }
}

/// Queries Hyprland through `hyprctl`.
pub struct HyprlandPointerApi {
    program: String,
}

impl Default for HyprlandPointerApi {
    fn default() -> Self {
        Self {
            program: "hyprctl".into(),
        }
    }
}

impl HyprlandPointerApi {
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = tokio::time::timeout(
            HYPRCTL_TIMEOUT,
            Command::new(&self.program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow!("{} {args:?} timed out", self.program))?
        .with_context(|| format!("Failed to run {} {args:?}", self.program))?;

        if !output.status.success() {
            bail!("{} {args:?} exited with {}", self.program, output.status);
        }
        let text = String::from_utf8(output.stdout)?.trim().to_string();
        if text.is_empty() {
            bail!("{} {args:?} returned nothing", self.program);
        }
        Ok(text)
    }
}

/// Parses the plain `hyprctl cursorpos` output, for example `1200, 640`.
fn parse_cursor_text(text: &str) -> Option<PointerPosition> {
    let (x, y) = text.split_once(',')?;
    let x = x.split_whitespace().last()?.parse::<f64>().ok()?;
    let y = y.split_whitespace().next()?.parse::<f64>().ok()?;
    (x.is_finite() && y.is_finite()).then_some(PointerPosition { x, y })
}

fn parse_cursor_json(text: &str) -> Option<PointerPosition> {
    let cursor = serde_json::from_str::<HyprCursor>(text).ok()?;
    (cursor.x.is_finite() && cursor.y.is_finite()).then_some(PointerPosition {
        x: cursor.x,
        y: cursor.y,
    })
}

fn parse_monitors(text: &str) -> Result<ScreenBounds> {
    let monitors = serde_json::from_str::<Vec<HyprMonitor>>(text)?;
    ScreenBounds::union(monitors.iter().map(HyprMonitor::logical_bounds))
        .ok_or_else(|| anyhow!("Hyprland reported no monitors"))
}

#[async_trait]
impl PointerApi for HyprlandPointerApi {
    #[instrument(skip(self))]
    async fn cursor_position(&mut self) -> Result<PointerPosition> {
        if let Some(position) = self
            .run(&["-j", "cursorpos"])
            .await
            .ok()
            .and_then(|v| parse_cursor_json(&v))
        {
            return Ok(position);
        }
        let text = self.run(&["cursorpos"]).await?;
        parse_cursor_text(&text).ok_or_else(|| anyhow!("Unexpected cursorpos output {text:?}"))
    }

    #[instrument(skip(self))]
    async fn screen_bounds(&mut self) -> Result<ScreenBounds> {
        let text = self.run(&["-j", "monitors"]).await?;
        parse_monitors(&text)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::pointer_api::{PointerApi, PointerPosition, ScreenBounds};

    use super::{parse_cursor_json, parse_cursor_text, parse_monitors, HyprlandPointerApi};

    #[test]
    fn test_cursor_json() {
        assert_eq!(
            parse_cursor_json(r#"{"x": 1200, "y": 640}"#),
            Some(PointerPosition { x: 1200., y: 640. })
        );
        assert_eq!(parse_cursor_json("1200, 640"), None);
    }

    #[test]
    fn test_cursor_text() {
        assert_eq!(
            parse_cursor_text("1200, 640"),
            Some(PointerPosition { x: 1200., y: 640. })
        );
        assert_eq!(
            parse_cursor_text("-5,0"),
            Some(PointerPosition { x: -5., y: 0. })
        );
        assert_eq!(parse_cursor_text("no cursor"), None);
    }

    #[test]
    fn test_monitors_are_scaled_and_rotated() -> Result<()> {
        let text = r#"[
            {"id": 0, "name": "eDP-1", "x": 0, "y": 0, "width": 2880, "height": 1800, "scale": 2.0, "transform": 0},
            {"id": 1, "name": "DP-1", "x": 1440, "y": 0, "width": 1920, "height": 1080, "scale": 1.0, "transform": 1}
        ]"#;
        assert_eq!(
            parse_monitors(text)?,
            ScreenBounds {
                x: 0,
                y: 0,
                width: 1440 + 1080,
                height: 1920
            }
        );
        Ok(())
    }

    #[test]
    fn test_no_monitors() {
        assert!(parse_monitors("[]").is_err());
    }

    #[tokio::test]
    async fn test_missing_hyprctl_is_unavailable() {
        let mut api = HyprlandPointerApi {
            program: "/nonexistent/hyprctl".into(),
        };
        assert!(api.cursor_position().await.is_err());
        assert!(api.screen_bounds().await.is_err());
    }
}
