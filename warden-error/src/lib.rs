use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HalError {
    /// True when the command could not complete in time (the child was killed).
    pub fn is_timeout(&self) -> bool {
        matches!(self, HalError::CommandTimeout { .. })
    }
}
