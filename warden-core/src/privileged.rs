//! Least-privilege command execution.
//!
//! Each call escalates exactly one argv (no shell, no session) through the configured prefix,
//! typically `sudo -n`.

use crate::config::PrivilegeConfig;
use std::sync::Arc;
use std::time::Duration;
use warden_hal::{CommandOutput, HalResult, ProcessOps};

#[derive(Clone)]
pub struct PrivilegedRunner {
    hal: Arc<dyn ProcessOps>,
    prefix: Vec<String>,
}

impl std::fmt::Debug for PrivilegedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegedRunner")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PrivilegedRunner {
    pub fn new(hal: Arc<dyn ProcessOps>, prefix: Vec<String>) -> Self {
        Self { hal, prefix }
    }

    /// Build from config, dropping the prefix when we already are root.
    pub fn from_config(hal: Arc<dyn ProcessOps>, cfg: &PrivilegeConfig) -> Self {
        let prefix = if cfg.skip_when_root && nix::unistd::geteuid().is_root() {
            Vec::new()
        } else {
            cfg.escalate.clone()
        };
        Self::new(hal, prefix)
    }

    /// Runs without escalation.
    pub fn direct(hal: Arc<dyn ProcessOps>) -> Self {
        Self::new(hal, Vec::new())
    }

    pub fn run(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<CommandOutput> {
        self.run_with_env(program, args, &[], timeout)
    }

    /// Run `program args...` escalated. `env` travels in the process environment, never argv.
    pub fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> HalResult<CommandOutput> {
        let Some((escalator, escalator_args)) = self.prefix.split_first() else {
            return self.hal.command_output_with_env(program, args, env, timeout);
        };

        let mut argv: Vec<String> = escalator_args.to_vec();
        // sudo resets the environment unless told which variables to keep.
        if !env.is_empty() && is_sudo(escalator) {
            let keys: Vec<&str> = env.iter().map(|(k, _)| *k).collect();
            argv.push(format!("--preserve-env={}", keys.join(",")));
        }
        argv.push(program.to_string());
        argv.extend(args.iter().map(|a| a.to_string()));

        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.hal
            .command_output_with_env(escalator, &argv_refs, env, timeout)
    }
}

fn is_sudo(program: &str) -> bool {
    program == "sudo" || program.ends_with("/sudo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_hal::{FakeHal, Operation};

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn prefixes_single_command() {
        let hal = FakeHal::new();
        let runner = PrivilegedRunner::new(
            Arc::new(hal.clone()),
            vec!["sudo".into(), "-n".into()],
        );
        runner
            .run("fail2ban-client", &["status", "sshd"], T)
            .unwrap();
        assert_eq!(
            hal.command_lines(),
            vec!["sudo -n fail2ban-client status sshd"]
        );
    }

    #[test]
    fn env_is_preserved_through_sudo_not_argv() {
        let hal = FakeHal::new();
        let runner = PrivilegedRunner::new(Arc::new(hal.clone()), vec!["sudo".into()]);
        runner
            .run_with_env("/opt/sync.sh", &[], &[("DB_USER", "u"), ("DB_PASS", "secret")], T)
            .unwrap();

        let lines = hal.command_lines();
        assert_eq!(lines, vec!["sudo --preserve-env=DB_USER,DB_PASS /opt/sync.sh"]);
        assert!(!lines[0].contains("secret"));
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { env, .. } if env.iter().any(|(k, v)| k == "DB_PASS" && v == "secret")
        )));
    }

    #[test]
    fn empty_prefix_runs_directly() {
        let hal = FakeHal::new();
        let runner = PrivilegedRunner::direct(Arc::new(hal.clone()));
        runner.run("systemctl", &["is-active", "fail2ban"], T).unwrap();
        assert_eq!(hal.command_lines(), vec!["systemctl is-active fail2ban"]);
    }
}
