use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::{
    daemon::storage::activity_event::{ActivityEvent, Side},
    pointer_api::{PointerApi, PointerPosition, ScreenBounds},
    utils::clock::Clock,
};

/// Periodically samples the pointer to accumulate travel distance and places clicks on the
/// heatmap when the collector asks for it. Runs beside the collector so a slow pointer query
/// never holds up line ingestion.
pub struct PointerTracker {
    api: Box<dyn PointerApi>,
    next: mpsc::Sender<ActivityEvent>,
    click_requests: mpsc::Receiver<Side>,
    shutdown: CancellationToken,
    sample_interval: Duration,
    clock: Box<dyn Clock>,
    previous: Option<PointerPosition>,
    last_bounds: Option<ScreenBounds>,
}

impl PointerTracker {
    pub fn new(
        api: Box<dyn PointerApi>,
        next: mpsc::Sender<ActivityEvent>,
        click_requests: mpsc::Receiver<Side>,
        shutdown: CancellationToken,
        sample_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            api,
            next,
            click_requests,
            shutdown,
            sample_interval,
            clock,
            previous: None,
            last_bounds: None,
        }
    }

    async fn position(&mut self) -> Option<PointerPosition> {
        self.api
            .cursor_position()
            .await
            .inspect_err(|e| trace!("Pointer position is unavailable {e:?}"))
            .ok()
    }

    async fn bounds(&mut self) -> Option<ScreenBounds> {
        self.api
            .screen_bounds()
            .await
            .inspect_err(|e| trace!("Screen bounds are unavailable {e:?}"))
            .ok()
    }

    /// One tick of the sampler. Distance is only measured between two consecutive samples that
    /// both had a position and screen bounds.
    async fn sample(&mut self) -> Vec<ActivityEvent> {
        let mut events = Vec::new();

        let bounds = self.bounds().await;
        if let Some(bounds) = bounds {
            if self.last_bounds != Some(bounds) {
                self.last_bounds = Some(bounds);
                events.push(ActivityEvent::ScreenSize(bounds));
            }
        }

        let current = match bounds {
            Some(_) => self.position().await,
            None => None,
        };
        if let (Some(previous), Some(current)) = (self.previous, current) {
            let distance_px = previous.distance_to(&current);
            if distance_px > 0. {
                events.push(ActivityEvent::Travel { distance_px });
            }
        }
        self.previous = current;

        events
    }

    async fn locate_click(&mut self, side: Side) -> Option<ActivityEvent> {
        let position = self.position().await;
        let bounds = self.bounds().await;
        match (position, bounds) {
            (Some(position), Some(bounds)) => Some(ActivityEvent::ClickPosition {
                side,
                position,
                bounds,
            }),
            _ => {
                debug!("Could not place {side} click on the heatmap");
                None
            }
        }
    }

    async fn send(&mut self, event: ActivityEvent) -> Result<()> {
        self.next
            .send(event)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    /// Executes the tracker event loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut requests_open = true;
        let mut sample_point = self.clock.instant();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                side = self.click_requests.recv(), if requests_open => {
                    match side {
                        Some(side) => {
                            if let Some(event) = self.locate_click(side).await {
                                self.send(event).await?;
                            }
                        }
                        None => requests_open = false,
                    }
                }
                _ = self.clock.sleep_until(sample_point) => {
                    for event in self.sample().await {
                        self.send(event).await?;
                    }
                    sample_point += self.sample_interval;
                    // Don't replay missed ticks after the process was suspended.
                    let now = self.clock.instant();
                    if sample_point < now {
                        sample_point = now + self.sample_interval;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::storage::activity_event::{ActivityEvent, Side},
        pointer_api::{MockPointerApi, PointerPosition, ScreenBounds},
        utils::clock::TestClock,
    };

    use super::PointerTracker;

    const BOUNDS: ScreenBounds = ScreenBounds {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    fn tracker_with(
        api: MockPointerApi,
    ) -> (
        PointerTracker,
        mpsc::Receiver<ActivityEvent>,
        mpsc::Sender<Side>,
        CancellationToken,
    ) {
        let (sender, receiver) = mpsc::channel(16);
        let (locator, requests) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let tracker = PointerTracker::new(
            Box::new(api),
            sender,
            requests,
            shutdown.clone(),
            Duration::from_millis(400),
            Box::new(TestClock::starting_at(Utc::now())),
        );
        (tracker, receiver, locator, shutdown)
    }

    fn positions(points: Vec<Option<(f64, f64)>>) -> MockPointerApi {
        let mut api = MockPointerApi::new();
        let mut points = points.into_iter();
        api.expect_cursor_position().returning(move || {
            points
                .next()
                .flatten()
                .map(|(x, y)| PointerPosition { x, y })
                .ok_or_else(|| anyhow!("no pointer"))
        });
        api.expect_screen_bounds().returning(|| Ok(BOUNDS));
        api
    }

    #[tokio::test]
    async fn test_two_samples_ten_pixels_apart() {
        let (mut tracker, _, _, _) =
            tracker_with(positions(vec![Some((100., 100.)), Some((106., 108.))]));

        assert_eq!(
            tracker.sample().await,
            vec![ActivityEvent::ScreenSize(BOUNDS)]
        );
        assert_eq!(
            tracker.sample().await,
            vec![ActivityEvent::Travel { distance_px: 10. }]
        );
    }

    #[tokio::test]
    async fn test_missing_sample_breaks_the_path() {
        let (mut tracker, _, _, _) = tracker_with(positions(vec![
            Some((0., 0.)),
            None,
            Some((30., 40.)),
            Some((30., 40.)),
            Some((33., 44.)),
        ]));

        tracker.sample().await;
        assert!(tracker.sample().await.is_empty());
        assert!(tracker.sample().await.is_empty());
        // Standing still produces nothing.
        assert!(tracker.sample().await.is_empty());
        assert_eq!(
            tracker.sample().await,
            vec![ActivityEvent::Travel { distance_px: 5. }]
        );
    }

    #[tokio::test]
    async fn test_no_travel_without_bounds() {
        let mut api = MockPointerApi::new();
        let mut x = 0.;
        api.expect_cursor_position().returning(move || {
            x += 10.;
            Ok(PointerPosition { x, y: 0. })
        });
        let mut bounds = vec![Ok(BOUNDS), Err(anyhow!("no monitors")), Ok(BOUNDS), Ok(BOUNDS)]
            .into_iter();
        api.expect_screen_bounds()
            .returning(move || bounds.next().unwrap_or(Ok(BOUNDS)));
        let (mut tracker, _, _, _) = tracker_with(api);

        assert_eq!(
            tracker.sample().await,
            vec![ActivityEvent::ScreenSize(BOUNDS)]
        );
        // The sample without bounds breaks the path like a missing position does.
        assert!(tracker.sample().await.is_empty());
        assert!(tracker.sample().await.is_empty());
        assert_eq!(
            tracker.sample().await,
            vec![ActivityEvent::Travel { distance_px: 10. }]
        );
    }

    #[tokio::test]
    async fn test_click_without_bounds_is_not_placed() {
        let mut api = MockPointerApi::new();
        api.expect_cursor_position()
            .returning(|| Ok(PointerPosition { x: 0., y: 0. }));
        api.expect_screen_bounds()
            .returning(|| Err(anyhow!("no monitors")));
        let (mut tracker, _, _, _) = tracker_with(api);

        assert_eq!(tracker.locate_click(Side::Right).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_places_requested_clicks() -> Result<()> {
        let (tracker, mut receiver, locator, shutdown) = tracker_with(positions(
            std::iter::repeat(Some((960., 540.))).take(64).collect(),
        ));

        let handle = tokio::spawn(tracker.run());

        assert_eq!(
            receiver.recv().await,
            Some(ActivityEvent::ScreenSize(BOUNDS))
        );

        locator.send(Side::Left).await?;
        assert_eq!(
            receiver.recv().await,
            Some(ActivityEvent::ClickPosition {
                side: Side::Left,
                position: PointerPosition { x: 960., y: 540. },
                bounds: BOUNDS,
            })
        );

        shutdown.cancel();
        handle.await??;
        Ok(())
    }
}
