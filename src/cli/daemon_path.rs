use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

pub const DAEMON_EXECUTABLE: &str = "inputstat-daemon";
const SERVE_COMMAND: &str = "serve";

/// Location of the daemon binary installed next to the cli.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_EXECUTABLE);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

/// Recognizes the processes of this installation that are a running daemon: the standalone
/// daemon binary, or the cli started as `inputstat serve`.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonExecutables {
    cli: PathBuf,
    daemon: PathBuf,
}

impl DaemonExecutables {
    pub fn new(cli: &Path) -> Self {
        Self {
            cli: cli.to_path_buf(),
            daemon: to_daemon_path(cli.to_path_buf()),
        }
    }

    /// `cmd` is the full command line including the program name.
    pub fn is_daemon(&self, exe: &Path, cmd: &[OsString]) -> bool {
        if exe == self.daemon {
            return true;
        }
        // Global flags are all switches, so the first positional argument is the subcommand.
        exe == self.cli
            && cmd
                .iter()
                .skip(1)
                .find(|arg| !arg.to_string_lossy().starts_with('-'))
                .is_some_and(|arg| arg == SERVE_COMMAND)
    }
}
