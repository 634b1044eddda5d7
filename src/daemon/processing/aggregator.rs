use std::time::Duration;

use anyhow::Result;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    daemon::storage::{
        activity_event::ActivityEvent, entities::AggregateState, state_storage::StateStorage,
    },
    utils::{clock::Clock, time::day_key},
};

use super::module::EventProcessor;

/// Owns the [AggregateState] and bridges the
/// [ProcessingModule](super::ProcessingModule) with a [StateStorage].
///
/// Writes are debounced: the first change opens a window of `save_delay`, every further change
/// inside it is folded into the single write happening when the window closes.
pub struct StateAggregator<S: StateStorage> {
    state: watch::Sender<AggregateState>,
    storage: S,
    clock: Box<dyn Clock>,
    save_delay: Duration,
    pending_save: Option<Instant>,
}

impl<S: StateStorage> StateAggregator<S> {
    /// Restores the persisted state, or starts fresh at the current time.
    pub async fn load(storage: S, clock: Box<dyn Clock>, save_delay: Duration) -> Self {
        let state = storage.load(AggregateState::new(clock.time())).await;
        info!(
            "Loaded state with {} clicks and {} keys",
            state.left + state.right,
            state.keys
        );
        let (state, _) = watch::channel(state);
        Self {
            state,
            storage,
            clock,
            save_delay,
            pending_save: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregateState> {
        self.state.subscribe()
    }

    fn schedule_save(&mut self) {
        if self.pending_save.is_none() {
            self.pending_save = Some(self.clock.instant() + self.save_delay);
        }
    }

    /// Persistence is best effort: failures are logged and the state stays in memory until the
    /// next change schedules another write.
    async fn save_now(&mut self) {
        self.pending_save = None;
        let snapshot = self.state.borrow().clone();
        match self.storage.save(&snapshot).await {
            Ok(()) => debug!("State persisted"),
            Err(e) => warn!("Failed to persist state {e:?}"),
        }
    }
}

impl<S: StateStorage> EventProcessor for StateAggregator<S> {
    async fn process_next(&mut self, event: ActivityEvent) -> Result<()> {
        if self.state.send_if_modified(|state| state.apply(&event)) {
            self.schedule_save();
        }
        Ok(())
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending_save
    }

    async fn on_deadline(&mut self) -> Result<()> {
        if self.pending_save.is_some() {
            self.save_now().await;
        }
        Ok(())
    }

    async fn on_day_check(&mut self) -> Result<()> {
        let today = day_key(self.clock.time());
        if self.state.send_if_modified(|state| state.stamp_day(&today)) {
            info!("Stamped day marker {today}");
            self.save_now().await;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.pending_save.is_some() {
            self.save_now().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{bail, Result};
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tokio::{sync::mpsc, time::Instant};

    use crate::{
        daemon::{
            processing::{module::EventProcessor, ProcessingModule},
            storage::{
                activity_event::{ActivityEvent, ClickSource, Side},
                entities::AggregateState,
                state_storage::StateStorage,
            },
        },
        utils::{clock::TestClock, logging::TEST_LOGGING, time::day_key},
    };

    use super::StateAggregator;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);
    const SAVE_DELAY: Duration = Duration::from_secs(2);
    const DAY_CHECK: Duration = Duration::from_secs(60);

    /// Keeps every written snapshot in memory.
    #[derive(Clone, Default)]
    struct MemoryStorage {
        initial: Option<AggregateState>,
        saved: Arc<Mutex<Vec<AggregateState>>>,
        failing: bool,
    }

    impl MemoryStorage {
        fn saved(&self) -> Vec<AggregateState> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl StateStorage for MemoryStorage {
        async fn load(&self, fallback: AggregateState) -> AggregateState {
            self.initial.clone().unwrap_or(fallback)
        }

        async fn save(&self, state: &AggregateState) -> Result<()> {
            if self.failing {
                bail!("disk is full");
            }
            self.saved.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn clock() -> Box<TestClock> {
        Box::new(TestClock::starting_at(Utc.from_utc_datetime(&TEST_START_DATE)))
    }

    fn left_click() -> ActivityEvent {
        ActivityEvent::Click {
            side: Side::Left,
            source: ClickSource::Mouse,
        }
    }

    async fn module(
        storage: MemoryStorage,
    ) -> (
        ProcessingModule<StateAggregator<MemoryStorage>>,
        mpsc::Sender<ActivityEvent>,
    ) {
        let (sender, receiver) = mpsc::channel(16);
        let aggregator = StateAggregator::load(storage, clock(), SAVE_DELAY).await;
        (
            ProcessingModule::new(receiver, aggregator, clock(), DAY_CHECK),
            sender,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_opens_once_per_window() -> Result<()> {
        let mut aggregator =
            StateAggregator::load(MemoryStorage::default(), clock(), SAVE_DELAY).await;
        assert_eq!(aggregator.next_deadline(), None);

        let start = Instant::now();
        aggregator.process_next(left_click()).await?;
        assert_eq!(aggregator.next_deadline(), Some(start + SAVE_DELAY));

        tokio::time::advance(Duration::from_millis(500)).await;
        aggregator.process_next(left_click()).await?;
        assert_eq!(aggregator.next_deadline(), Some(start + SAVE_DELAY));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_state_schedules_nothing() -> Result<()> {
        let mut aggregator =
            StateAggregator::load(MemoryStorage::default(), clock(), SAVE_DELAY).await;
        aggregator
            .process_next(ActivityEvent::Scroll {
                vertical: None,
                horizontal: Some(0.),
            })
            .await?;
        aggregator
            .process_next(ActivityEvent::Travel { distance_px: 0. })
            .await?;
        assert_eq!(aggregator.next_deadline(), None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_coalesce_into_one_write() -> Result<()> {
        *TEST_LOGGING;
        let storage = MemoryStorage::default();
        let (module, sender) = module(storage.clone()).await;

        let (result, _) = tokio::join!(module.run(), async {
            for _ in 0..3 {
                sender.send(left_click()).await.unwrap();
            }
            sender
                .send(ActivityEvent::Key {
                    name: "KEY_A".into(),
                })
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(storage.saved().is_empty());

            tokio::time::sleep(Duration::from_millis(1000)).await;
            let saved = storage.saved();
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].left, 3);
            assert_eq!(saved[0].keys, 1);

            sender.send(left_click()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(storage.saved().len(), 2);
            drop(sender);
        });
        result?;

        // Nothing was pending at shutdown.
        assert_eq!(storage.saved().len(), 2);
        assert_eq!(storage.saved()[1].left, 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_state_is_saved_on_shutdown() -> Result<()> {
        let storage = MemoryStorage::default();
        let (module, sender) = module(storage.clone()).await;

        sender.send(left_click()).await?;
        drop(sender);
        module.run().await?;

        let saved = storage.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].left_mouse, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_check_stamps_missing_marker() -> Result<()> {
        let mut initial = AggregateState::new(Utc.from_utc_datetime(&TEST_START_DATE));
        initial.date = String::new();
        let storage = MemoryStorage {
            initial: Some(initial),
            ..Default::default()
        };
        let (module, sender) = module(storage.clone()).await;

        let (result, _) = tokio::join!(module.run(), async {
            tokio::time::sleep(DAY_CHECK + Duration::from_secs(1)).await;
            let saved = storage.saved();
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].date, day_key(Utc.from_utc_datetime(&TEST_START_DATE)));

            // The marker is never rotated afterwards.
            tokio::time::sleep(DAY_CHECK * 3).await;
            assert_eq!(storage.saved().len(), 1);
            drop(sender);
        });
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_writes_are_swallowed() -> Result<()> {
        let storage = MemoryStorage {
            failing: true,
            ..Default::default()
        };
        let (module, sender) = module(storage.clone()).await;

        let (result, _) = tokio::join!(module.run(), async {
            sender.send(left_click()).await.unwrap();
            tokio::time::sleep(SAVE_DELAY * 2).await;
            sender.send(left_click()).await.unwrap();
            drop(sender);
        });
        result?;
        assert!(storage.saved().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() -> Result<()> {
        let mut aggregator =
            StateAggregator::load(MemoryStorage::default(), clock(), SAVE_DELAY).await;
        let mut receiver = aggregator.subscribe();

        aggregator.process_next(left_click()).await?;

        assert!(receiver.has_changed()?);
        assert_eq!(receiver.borrow_and_update().left, 1);
        Ok(())
    }
}
