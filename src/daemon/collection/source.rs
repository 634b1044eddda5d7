use std::{pin::Pin, process::Stdio};

use anyhow::{anyhow, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
};
use tokio_stream::{wrappers::LinesStream, Stream, StreamExt};
use tracing::{info, trace, warn};

pub const DEFAULT_SOURCE_COMMAND: &str = "libinput debug-events --show-keycodes";

/// Lazily produced raw lines of the event source, already trimmed and without blank lines.
pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Owns the external event logger process.
pub struct EventSource {
    child: Child,
}

impl EventSource {
    /// Starts `command` (program followed by its arguments) with stdin closed and returns the
    /// merged stdout and stderr lines. There are no retries, a failure here is permanent for the
    /// lifetime of the daemon.
    pub fn spawn(command: &[String]) -> Result<(Self, LineStream)> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("Event source command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn event source {program:?}"))?;

        let stdout = child
            .stdout
            .take()
            .context("Event source stdout is not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("Event source stderr is not captured")?;

        info!("Started event source {command:?} with pid {:?}", child.id());

        Ok((Self { child }, merged_lines(stdout, stderr)))
    }

    pub async fn terminate(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => info!("Event source already exited with {status}"),
            _ => match self.child.kill().await {
                Ok(()) => info!("Event source terminated"),
                Err(e) => warn!("Failed to terminate event source {e:?}"),
            },
        }
    }
}

/// Both streams are treated as input. Lines that fail to decode are skipped.
pub fn merged_lines(
    stdout: impl AsyncRead + Send + 'static,
    stderr: impl AsyncRead + Send + 'static,
) -> LineStream {
    let stdout = LinesStream::new(BufReader::new(stdout).lines());
    let stderr = LinesStream::new(BufReader::new(stderr).lines());

    Box::pin(
        stdout
            .merge(stderr)
            .filter_map(|line| {
                line.inspect_err(|e| trace!("Skipping unreadable line {e:?}"))
                    .ok()
            })
            .map(|line| line.trim().to_owned())
            .filter(|line| !line.is_empty()),
    )
}

/// Splits a command line on whitespace. Quoting is not supported.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio_stream::StreamExt;

    use super::{merged_lines, split_command, EventSource, DEFAULT_SOURCE_COMMAND};

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command(DEFAULT_SOURCE_COMMAND),
            vec!["libinput", "debug-events", "--show-keycodes"]
        );
        assert!(split_command("   ").is_empty());
    }

    #[tokio::test]
    async fn test_lines_are_trimmed_and_merged() {
        let stdout = Cursor::new(b"  event4 KEYBOARD_KEY  \n\n   \nsecond\n".to_vec());
        let stderr = Cursor::new(b"warning line\n".to_vec());

        let mut lines = merged_lines(stdout, stderr).collect::<Vec<_>>().await;
        lines.sort();

        assert_eq!(
            lines,
            vec!["event4 KEYBOARD_KEY", "second", "warning line"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let result = EventSource::spawn(&["/nonexistent/inputstat-source".into()]);
        assert!(result.is_err());
        assert!(EventSource::spawn(&[]).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_process_lines() {
        let (source, lines) = EventSource::spawn(&[
            "sh".into(),
            "-c".into(),
            "echo first; echo second 1>&2".into(),
        ])
        .unwrap();

        let mut lines = lines.collect::<Vec<_>>().await;
        lines.sort();
        assert_eq!(lines, vec!["first", "second"]);

        source.terminate().await;
    }
}
