use std::{ffi::OsString, path::PathBuf};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Pid, Process, Signal, System};
use tracing::info;

use super::daemon_path::DaemonExecutables;

fn is_other_instance(
    pid: &Pid,
    process: &Process,
    current_id: Pid,
    executables: &DaemonExecutables,
) -> bool {
    if *pid == current_id {
        return false;
    }
    if matches!(process.parent(), Some(p) if p == current_id) {
        return false;
    }
    process
        .exe()
        .filter(|v| v.exists())
        .is_some_and(|exe| executables.is_daemon(exe, process.cmd()))
}

/// Terminates every other running daemon. Returns how many were stopped.
pub fn kill_previous_servers(executables: &DaemonExecutables) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get own pid {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if !is_other_instance(pid, process, current_id, executables) {
            continue;
        }
        info!("Stopping daemon with pid {pid}");
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
        killed += 1;
    }
    Ok(killed)
}

/// Whether some daemon of this installation is alive.
pub fn is_server_running(executables: &DaemonExecutables) -> Result<bool> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get own pid {e}"))?;
    Ok(system
        .processes()
        .iter()
        .any(|(pid, process)| is_other_instance(pid, process, current_id, executables)))
}

/// Intended for shutting down previous server and starting new one. Currently for simplicity sake
/// it operates using a detached process.
pub fn restart_server(
    cli: PathBuf,
    executables: &DaemonExecutables,
    args: Vec<OsString>,
) -> Result<()> {
    kill_previous_servers(executables)?;
    let mut command = std::process::Command::new(cli);
    command.arg("serve").args(args);

    #[cfg(unix)]
    {
        use std::{os::unix::process::CommandExt, process::Stdio};
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());
    }

    println!("Spawning");
    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    println!("Success, daemon pid is {}", child.id());
    Ok(())
}
