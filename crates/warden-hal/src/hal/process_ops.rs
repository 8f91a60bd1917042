//! Process execution helpers.
//!
//! External commands are considered "world-touching" and must go through the HAL so we can
//! test jail control and whitelist sync without spawning real processes.

use crate::{HalError, HalResult};
use std::time::Duration;

/// Captured result of one finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Process execution trait (external command runner).
///
/// Implementations never go through a shell: `program` and `args` are handed to the OS as-is.
/// Every call carries an explicit timeout; a child that outlives it is killed.
pub trait ProcessOps: Send + Sync {
    fn command_output_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> HalResult<CommandOutput>;

    fn command_output(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> HalResult<CommandOutput> {
        self.command_output_with_env(program, args, &[], timeout)
    }

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let output = self.command_output(program, args, timeout)?;
        if !output.success() {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
