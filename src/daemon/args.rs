use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

use crate::utils::dir::{create_application_default_path, STATE_FILE_NAME};

use super::{
    collection::source::{split_command, DEFAULT_SOURCE_COMMAND},
    config::DaemonConfig,
};

/// Options shared by the daemon binary and `inputstat serve`/`inputstat init`.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct DaemonOptions {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long = "state-file", help = "State file. Defaults to input-counts.json in the application directory")]
    pub state_file: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_SOURCE_COMMAND, help = "Command printing one input event per line")]
    pub source: String,
    #[arg(long = "pointer-interval-ms", default_value_t = 400)]
    pub pointer_interval_ms: u64,
    #[arg(long = "save-delay-ms", default_value_t = 2000)]
    pub save_delay_ms: u64,
    #[arg(long = "day-check-interval-ms", default_value_t = 60_000)]
    pub day_check_interval_ms: u64,
}

impl DaemonOptions {
    /// Turns the options back into arguments, used when spawning a detached daemon.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(dir) = &self.dir {
            args.extend(["--dir".into(), dir.into()]);
        }
        if let Some(state_file) = &self.state_file {
            args.extend(["--state-file".into(), state_file.into()]);
        }
        args.extend([
            "--source".into(),
            self.source.clone().into(),
            "--pointer-interval-ms".into(),
            self.pointer_interval_ms.to_string().into(),
            "--save-delay-ms".into(),
            self.save_delay_ms.to_string().into(),
            "--day-check-interval-ms".into(),
            self.day_check_interval_ms.to_string().into(),
        ]);
        args
    }

    pub fn resolve(self) -> Result<DaemonConfig> {
        let source_command = split_command(&self.source);
        if source_command.is_empty() {
            bail!("Event source command can't be empty");
        }
        if self.pointer_interval_ms == 0 || self.day_check_interval_ms == 0 {
            bail!("Timer intervals must be positive");
        }

        // The daemon changes its working directory, so relative paths are fixed here.
        let dir = std::path::absolute(self.dir.map_or_else(create_application_default_path, Ok)?)?;
        let state_file = match self.state_file {
            Some(state_file) => std::path::absolute(state_file)?,
            None => dir.join(STATE_FILE_NAME),
        };
        Ok(DaemonConfig {
            state_file,
            dir,
            source_command,
            pointer_interval: Duration::from_millis(self.pointer_interval_ms),
            save_delay: Duration::from_millis(self.save_delay_ms),
            day_check_interval: Duration::from_millis(self.day_check_interval_ms),
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "inputstat-daemon", version, about = "Collects pointer and keyboard activity")]
pub struct DaemonArgs {
    #[command(flatten)]
    pub options: DaemonOptions,
    /// Stay attached to the terminal instead of detaching.
    #[arg(long)]
    pub force: bool,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
