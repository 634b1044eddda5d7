//!  Storage is organized through [state_storage::StateFileStorage].
//!  The basic idea is:
//!   - There is a single JSON file holding the whole [entities::AggregateState].
//!   - The file is rewritten atomically as a whole, never appended to.
//!   - Reading is tolerant: every field is validated on its own and falls back to a default.

pub mod activity_event;
pub mod entities;
pub mod state_storage;
