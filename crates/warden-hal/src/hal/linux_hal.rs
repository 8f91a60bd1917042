//! Linux HAL implementation spawning real processes.

use super::{CommandOutput, ProcessOps};
use crate::{HalError, HalResult};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_with_timeout(
    program: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> HalResult<CommandOutput> {
    // Avoid commands hanging waiting for input (sudo password prompts included).
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Own process group, so a timeout also reaches grandchildren (the command under sudo).
        .process_group(0);
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let pgid = Pid::from_raw(child.id() as i32);
            if let Err(errno) = killpg(pgid, Signal::SIGKILL) {
                log::debug!("killpg({}) failed: {}", pgid, errno);
            }
            let _ = child.kill();
            let _ = child.wait();
            // A grandchild that escaped the group kill (e.g. a root process under sudo) may still
            // hold the pipes; the drain threads are left to finish on their own.
            drop(stdout_handle);
            drop(stderr_handle);
            log::warn!("{} timed out after {}s, killed", program, timeout.as_secs());
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

impl ProcessOps for LinuxHal {
    fn command_output_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> HalResult<CommandOutput> {
        log::debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        output_with_timeout(program, &mut cmd, timeout)
    }
}
