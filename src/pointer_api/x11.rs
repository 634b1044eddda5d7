use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::instrument;
use xcb::{randr, x, Connection};

use super::{PointerApi, PointerPosition, ScreenBounds};

pub struct X11PointerApi {
    connection: Connection,
    root: x::Window,
}

impl X11PointerApi {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) =
            Connection::connect_with_extensions(None, &[xcb::Extension::RandR], &[])?;
        // Currently the application only supports 1 x11 screen.
        let root = connection
            .get_setup()
            .roots()
            .nth(preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("X11 screen {preferred_screen} does not exist"))?
            .root();
        Ok(Self { connection, root })
    }
}

// Replies are awaited synchronously, so each query blocks the runtime for one X server round
// trip.
#[async_trait]
impl PointerApi for X11PointerApi {
    #[instrument(skip(self))]
    async fn cursor_position(&mut self) -> Result<PointerPosition> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&x::QueryPointer { window: self.root }))?;
        Ok(PointerPosition {
            x: reply.root_x() as f64,
            y: reply.root_y() as f64,
        })
    }

    #[instrument(skip(self))]
    async fn screen_bounds(&mut self) -> Result<ScreenBounds> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&randr::GetMonitors {
                window: self.root,
                get_active: true,
            }))?;
        ScreenBounds::union(reply.monitors().map(|monitor| ScreenBounds {
            x: monitor.x() as i32,
            y: monitor.y() as i32,
            width: monitor.width() as u32,
            height: monitor.height() as u32,
        }))
        .ok_or_else(|| anyhow!("RandR reported no monitors"))
    }
}
