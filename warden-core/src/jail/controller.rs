//! Read and mutate one fail2ban jail through `fail2ban-client`.

use super::status::{is_socket_unreachable, parse_status, JailStatus};
use crate::actor::Actor;
use crate::config::JailConfig;
use crate::confirm::UnbanAllToken;
use crate::errors::WardenError;
use crate::privileged::PrivilegedRunner;
use anyhow::{Context, Result};
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct BanController {
    runner: PrivilegedRunner,
    cfg: JailConfig,
}

impl BanController {
    pub fn new(runner: PrivilegedRunner, cfg: JailConfig) -> Self {
        Self { runner, cfg }
    }

    pub fn jail_name(&self) -> &str {
        &self.cfg.name
    }

    /// `systemctl is-active <service>` reports exactly "active". Any failure counts as not running.
    pub fn is_service_running(&self) -> bool {
        let result = self.runner.run(
            &self.cfg.systemctl,
            &["is-active", &self.cfg.service],
            self.cfg.status_timeout(),
        );
        match result {
            Ok(out) => out.success() && out.stdout.trim() == "active",
            Err(err) => {
                log::warn!("liveness check for {} failed: {}", self.cfg.service, err);
                false
            }
        }
    }

    /// Current jail snapshot.
    ///
    /// An unreachable server (not running, or socket errors) yields a degraded status with
    /// `error` set. Any other client failure is returned as an error.
    pub fn get_status(&self) -> Result<JailStatus> {
        if !self.is_service_running() {
            log::warn!("Fail2ban service is not running");
            return Ok(JailStatus::service_down(&self.cfg.name));
        }

        let out = self
            .runner
            .run(
                &self.cfg.client,
                &["status", &self.cfg.name],
                self.cfg.status_timeout(),
            )
            .with_context(|| format!("Failed to query status of jail {}", self.cfg.name))?;

        if !out.success() {
            log::error!(
                "Fail2ban status command failed: exit={:?} stderr={:?} stdout={:?}",
                out.code,
                out.stderr.trim(),
                out.stdout.trim()
            );
            if is_socket_unreachable(&out.stderr) {
                return Ok(JailStatus::service_down(&self.cfg.name));
            }
            return Err(WardenError::StatusQueryFailed {
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            }
            .into());
        }

        log::debug!("Fail2ban status output: {}", out.stdout);
        let status = parse_status(&self.cfg.name, &out.stdout);
        log::info!(
            "Parsed Fail2ban status: jail={} enabled={} currently_banned={} total_banned={}",
            status.jail_name,
            status.enabled,
            status.currently_banned,
            status.total_banned
        );
        Ok(status)
    }

    pub fn get_banned_ips(&self) -> Result<Vec<String>> {
        Ok(self.get_status()?.banned_ips)
    }

    pub fn unban_ip(&self, actor: &Actor, ip: &str) -> bool {
        self.mutate_one(actor, "unbanip", ip, "unbanned")
    }

    pub fn ban_ip(&self, actor: &Actor, ip: &str) -> bool {
        self.mutate_one(actor, "banip", ip, "banned")
    }

    /// Drop every ban in the jail. Irreversible, hence the token.
    pub fn unban_all(&self, actor: &Actor, _token: UnbanAllToken) -> bool {
        let ok = self.run_set(&["unban", "--all"]);
        match ok {
            Ok(()) => {
                log::warn!(
                    "All IPs unbanned via admin action: jail={} user={}",
                    self.cfg.name,
                    actor
                );
                true
            }
            Err(err) => {
                log::error!(
                    "Failed to unban all IPs: jail={} user={} error={:#}",
                    self.cfg.name,
                    actor,
                    err
                );
                false
            }
        }
    }

    fn mutate_one(&self, actor: &Actor, verb: &str, ip: &str, past: &str) -> bool {
        let ip = ip.trim();
        if ip.parse::<IpAddr>().is_err() {
            log::error!(
                "Refusing {}: not an IP address: ip={:?} user={}",
                verb,
                ip,
                actor
            );
            return false;
        }

        match self.run_set(&[verb, ip]) {
            Ok(()) => {
                log::info!(
                    "IP {} via admin action: jail={} ip={} user={}",
                    past,
                    self.cfg.name,
                    ip,
                    actor
                );
                true
            }
            Err(err) => {
                log::error!(
                    "Failed to {}: jail={} ip={} user={} error={:#}",
                    verb,
                    self.cfg.name,
                    ip,
                    actor,
                    err
                );
                false
            }
        }
    }

    /// `fail2ban-client set <jail> <args...>`; non-zero exit becomes an error.
    fn run_set(&self, args: &[&str]) -> Result<()> {
        let mut argv = vec!["set", self.cfg.name.as_str()];
        argv.extend_from_slice(args);
        let out = self
            .runner
            .run(&self.cfg.client, &argv, self.cfg.command_timeout())?;
        if !out.success() {
            anyhow::bail!(
                "exit={:?} stderr={:?}",
                out.code,
                out.stderr.trim()
            );
        }
        Ok(())
    }
}
