use std::future::Future;

use anyhow::Result;
use tokio::time::Instant;

use crate::daemon::storage::activity_event::ActivityEvent;

/// Represents an event processor, the single owner of whatever state the events fold into.
/// Besides events it is driven by two timers: its own deadline, which it reports through
/// [EventProcessor::next_deadline], and the periodic day check.
pub trait EventProcessor {
    fn process_next(&mut self, event: ActivityEvent) -> impl Future<Output = Result<()>>;

    /// `None` while the processor has nothing scheduled.
    fn next_deadline(&self) -> Option<Instant>;

    fn on_deadline(&mut self) -> impl Future<Output = Result<()>>;

    fn on_day_check(&mut self) -> impl Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl Future<Output = Result<()>>;
}
