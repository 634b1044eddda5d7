use std::time::Duration;

use anyhow::Result;
use module::EventProcessor;
use tokio::{sync::mpsc::Receiver, time::Instant};
use tracing::{error, trace};

use crate::utils::clock::Clock;

use super::storage::activity_event::ActivityEvent;

pub mod aggregator;
pub mod module;

/// Sequential owner of the processing side. Every event, deadline and day check is handled on
/// this one loop, so the processor never sees concurrent mutation.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<ActivityEvent>,
    processor: Processor,
    clock: Box<dyn Clock>,
    day_check_interval: Duration,
}

async fn sleep_until_deadline(clock: &dyn Clock, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(
        receiver: Receiver<ActivityEvent>,
        processor: P,
        clock: Box<dyn Clock>,
        day_check_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            processor,
            clock,
            day_check_interval,
        }
    }

    /// Runs until every sender is dropped, then finalizes the processor.
    pub async fn run(mut self) -> Result<()> {
        let mut day_check = self.clock.instant() + self.day_check_interval;

        loop {
            let deadline = self.processor.next_deadline();
            tokio::select! {
                event = self.receiver.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    trace!("Processing event {:?}", event);
                    if let Err(e) = self.processor.process_next(event.clone()).await {
                        error!("Error processing event {:?}: {e:?}", event)
                    }
                }
                _ = sleep_until_deadline(self.clock.as_ref(), deadline) => {
                    if let Err(e) = self.processor.on_deadline().await {
                        error!("Error handling processor deadline {e:?}")
                    }
                }
                _ = self.clock.sleep_until(day_check) => {
                    day_check += self.day_check_interval;
                    if let Err(e) = self.processor.on_day_check().await {
                        error!("Error during day check {e:?}")
                    }
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
