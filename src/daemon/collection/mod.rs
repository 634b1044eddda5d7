//! Everything that produces [ActivityEvent](super::storage::activity_event::ActivityEvent)s:
//! the event source process, its line grammar, device state and the pointer tracker.

pub mod collector;
pub mod devices;
pub mod parser;
pub mod pointer;
pub mod source;
