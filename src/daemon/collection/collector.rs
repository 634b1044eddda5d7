use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::daemon::storage::activity_event::{ActivityEvent, Side};

use super::{devices::DeviceRegistry, parser::parse_line, source::LineStream};

/// Turns raw event source lines into [ActivityEvent]s for the processing module.
pub struct InputCollectionModule {
    lines: LineStream,
    registry: DeviceRegistry,
    next: mpsc::Sender<ActivityEvent>,
    click_locator: mpsc::Sender<Side>,
    shutdown: CancellationToken,
}

impl InputCollectionModule {
    pub fn new(
        lines: LineStream,
        next: mpsc::Sender<ActivityEvent>,
        click_locator: mpsc::Sender<Side>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            lines,
            registry: DeviceRegistry::default(),
            next,
            click_locator,
            shutdown,
        }
    }

    fn classify(&mut self, line: &str) -> Option<ActivityEvent> {
        match parse_line(line) {
            Ok(event) => self.registry.resolve(event),
            Err(e) => {
                trace!("Discarding line {line:?}: {e}");
                None
            }
        }
    }

    fn request_click_position(&self, side: Side) {
        match self.click_locator.try_send(side) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Pointer tracker is busy, skipping placement"),
            Err(TrySendError::Closed(_)) => trace!("Pointer tracker is gone"),
        }
    }

    /// Executes the collector event loop. Returns when the line stream ends or on shutdown.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                line = self.lines.next() => line,
            };

            let Some(line) = line else {
                warn!("Event source stopped producing lines");
                return Ok(());
            };

            let Some(event) = self.classify(&line) else {
                continue;
            };

            let click_side = match event {
                ActivityEvent::Click { side, .. } => Some(side),
                _ => None,
            };

            self.next
                .send(event)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            if let Some(side) = click_side {
                self.request_click_position(side);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::daemon::storage::activity_event::{ActivityEvent, ClickSource, Side};

    use super::InputCollectionModule;

    fn lines(lines: &[&str]) -> super::LineStream {
        let owned = lines.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        Box::pin(tokio_stream::iter(owned))
    }

    #[tokio::test]
    async fn test_forwards_classified_events() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel(16);
        let (locator, mut locations) = mpsc::channel(16);

        let collector = InputCollectionModule::new(
            lines(&[
                r#"{"type":"pointer_button","state":"pressed","button":272}"#,
                "complete garbage",
                "-event7 DEVICE_ADDED SynPS/2 Synaptics TouchPad seat0",
                "event7 POINTER_BUTTON +1.2s BTN_LEFT (272) pressed, seat count: 1",
                "event7 POINTER_BUTTON +1.3s BTN_LEFT (272) released, seat count: 0",
                "event3 KEYBOARD_KEY +2.0s KEY_A (30) pressed",
            ]),
            sender,
            locator,
            CancellationToken::new(),
        );
        collector.run().await?;

        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ActivityEvent::Click {
                    side: Side::Left,
                    source: ClickSource::Mouse
                },
                ActivityEvent::Click {
                    side: Side::Left,
                    source: ClickSource::Touchpad
                },
                ActivityEvent::Key {
                    name: "KEY_A".into()
                },
            ]
        );

        assert_eq!(locations.recv().await, Some(Side::Left));
        assert_eq!(locations.recv().await, Some(Side::Left));
        assert_eq!(locations.recv().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_locator_does_not_block() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel(16);
        let (locator, mut locations) = mpsc::channel(1);

        let collector = InputCollectionModule::new(
            lines(&[
                "event3 POINTER_BUTTON +1s BTN_LEFT (272) pressed",
                "event3 POINTER_BUTTON +2s BTN_RIGHT (273) pressed",
            ]),
            sender,
            locator,
            CancellationToken::new(),
        );
        collector.run().await?;

        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_some());
        assert_eq!(locations.recv().await, Some(Side::Left));
        assert_eq!(locations.recv().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() -> Result<()> {
        let (sender, _receiver) = mpsc::channel(16);
        let (locator, _locations) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let collector = InputCollectionModule::new(
            Box::pin(tokio_stream::pending::<String>()),
            sender,
            locator,
            shutdown.clone(),
        );
        shutdown.cancel();
        collector.run().await
    }
}
