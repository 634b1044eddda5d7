use std::{future::Future, io::ErrorKind, path::PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::fs::operations::write_atomically;

use super::entities::AggregateState;

/// Interface for abstracting persistence of the [AggregateState].
pub trait StateStorage {
    /// Reads the persisted state. Never fails: a missing, unreadable or unparsable file yields
    /// `fallback`, a partially valid one is normalized field by field.
    fn load(&self, fallback: AggregateState) -> impl Future<Output = AggregateState>;

    /// Replaces the persisted state with `state`.
    fn save(&self, state: &AggregateState) -> impl Future<Output = Result<()>>;
}

/// The main realization of [StateStorage]. Keeps the whole state in a single JSON file that is
/// also what external dashboards read.
pub struct StateFileStorage {
    path: PathBuf,
}

impl StateFileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateStorage for StateFileStorage {
    async fn load(&self, fallback: AggregateState) -> AggregateState {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state at {:?}, starting fresh", self.path);
                return fallback;
            }
            Err(e) => {
                warn!("Failed to read state at {:?}: {e}", self.path);
                return fallback;
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&contents) {
            Ok(value) => AggregateState::from_json_value(&value, fallback),
            Err(e) => {
                // Might happen if the file was edited by hand or written by something else.
                warn!("State at {:?} is not valid json: {e}", self.path);
                fallback
            }
        }
    }

    async fn save(&self, state: &AggregateState) -> Result<()> {
        let contents = serde_json::to_vec(state)?;
        write_atomically(&self.path, &contents).await?;
        debug!("Saved {} bytes of state to {:?}", contents.len(), self.path);
        Ok(())
    }
}
