//! Fake HAL implementation for testing.
//!
//! This implementation records every command without executing it and answers with
//! scripted responses, allowing CI-safe testing without root privileges or a fail2ban install.

use super::{CommandOutput, ProcessOps};
use crate::{HalError, HalResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
        timeout_secs: u64,
    },
}

impl Operation {
    /// The full argv joined by single spaces (program first).
    pub fn command_line(&self) -> String {
        match self {
            Operation::Command { program, args, .. } => {
                let mut line = program.clone();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
        }
    }
}

/// Scripted answer for a matching command.
#[derive(Debug, Clone)]
pub struct FakeResponse {
    code: Option<i32>,
    stdout: String,
    stderr: String,
    delay: Duration,
    timeout: bool,
}

impl FakeResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            delay: Duration::ZERO,
            timeout: false,
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
            delay: Duration::ZERO,
            timeout: false,
        }
    }

    /// Simulate a child that had to be killed after exceeding its timeout.
    pub fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::ok("")
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sleep before answering; widens race windows in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
struct Rule {
    suffix: String,
    response: FakeResponse,
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Scripted responses, newest first wins
    rules: Vec<Rule>,
}

/// Fake HAL implementation that records operations without executing them.
///
/// A rule matches when the recorded command line ends with the rule's pattern on a word
/// boundary, so `"systemctl is-active fail2ban"` matches both the bare command and
/// `"sudo -n systemctl is-active fail2ban"`. Unmatched commands succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHalState::default())),
        }
    }

    /// Script the response for every command line ending in `pattern`.
    pub fn respond(&self, pattern: &str, response: FakeResponse) -> &Self {
        self.state.lock().unwrap().rules.push(Rule {
            suffix: pattern.to_string(),
            response,
        });
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Recorded command lines, in execution order.
    pub fn command_lines(&self) -> Vec<String> {
        self.operations().iter().map(Operation::command_line).collect()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state.lock().unwrap().operations.iter().any(check)
    }

    /// Check whether any recorded command line ends with `pattern`.
    pub fn ran(&self, pattern: &str) -> bool {
        self.command_lines()
            .iter()
            .any(|line| matches_suffix(line, pattern))
    }

    /// Clear all recorded operations (scripted responses are kept).
    pub fn clear(&self) {
        self.state.lock().unwrap().operations.clear();
    }

    fn record_operation(&self, op: Operation) -> Option<FakeResponse> {
        let mut state = self.state.lock().unwrap();
        let line = op.command_line();
        state.operations.push(op);
        state
            .rules
            .iter()
            .rev()
            .find(|rule| matches_suffix(&line, &rule.suffix))
            .map(|rule| rule.response.clone())
    }
}

fn matches_suffix(line: &str, pattern: &str) -> bool {
    if line == pattern {
        return true;
    }
    line.strip_suffix(pattern)
        .is_some_and(|head| head.ends_with(' '))
}

impl ProcessOps for FakeHal {
    fn command_output_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> HalResult<CommandOutput> {
        let response = self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timeout_secs: timeout.as_secs(),
        });
        log::info!("FAKE HAL: {} {}", program, args.join(" "));

        let Some(response) = response else {
            return Ok(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            });
        };

        if !response.delay.is_zero() {
            std::thread::sleep(response.delay);
        }
        if response.timeout {
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(CommandOutput {
            code: response.code,
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }
}
