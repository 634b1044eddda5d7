use std::{path::PathBuf, time::Duration};

use crate::utils::dir::STATE_FILE_NAME;

use super::collection::source::{split_command, DEFAULT_SOURCE_COMMAND};

pub const DEFAULT_POINTER_INTERVAL: Duration = Duration::from_millis(400);
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_DAY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Resolved daemon settings. Built once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub dir: PathBuf,
    pub state_file: PathBuf,
    /// Program followed by its arguments.
    pub source_command: Vec<String>,
    pub pointer_interval: Duration,
    pub save_delay: Duration,
    pub day_check_interval: Duration,
}

impl DaemonConfig {
    pub fn with_defaults(dir: PathBuf) -> Self {
        Self {
            state_file: dir.join(STATE_FILE_NAME),
            dir,
            source_command: split_command(DEFAULT_SOURCE_COMMAND),
            pointer_interval: DEFAULT_POINTER_INTERVAL,
            save_delay: DEFAULT_SAVE_DELAY,
            day_check_interval: DEFAULT_DAY_CHECK_INTERVAL,
        }
    }
}
