//! Making a patched jail config effective.

use super::entry::WhitelistEntry;
use crate::config::{ActivationMode, JailConfig};
use crate::errors::WardenError;
use crate::privileged::PrivilegedRunner;
use anyhow::{Context, Result};
use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use warden_hal::CommandOutput;

#[derive(Debug, Clone)]
pub struct Activator {
    runner: PrivilegedRunner,
    jail: JailConfig,
    mode: ActivationMode,
    timeout: Duration,
}

impl Activator {
    pub fn new(
        runner: PrivilegedRunner,
        jail: JailConfig,
        mode: ActivationMode,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            jail,
            mode,
            timeout,
        }
    }

    pub fn activate(&self, entries: &[WhitelistEntry]) -> Result<()> {
        match self.mode {
            ActivationMode::Restart => {
                self.step(&self.jail.systemctl, &["restart", &self.jail.service])
            }
            ActivationMode::Reload => self.step(&self.jail.client, &["reload", &self.jail.name]),
            ActivationMode::LiveSet => self.live_set(entries),
        }
    }

    /// Converge the running jail's ignore list without restarting fail2ban.
    fn live_set(&self, entries: &[WhitelistEntry]) -> Result<()> {
        let out = self.checked(&self.jail.client, &["get", &self.jail.name, "ignoreip"])?;
        let live = parse_ignore_list(&out.stdout);
        let wanted: Vec<&str> = entries.iter().map(|e| e.ip_or_cidr.as_str()).collect();

        // fail2ban reports networks with host bits cleared, so compare canonical forms.
        let live_set: HashSet<String> = live.iter().map(|a| canonical_address(a)).collect();
        let wanted_set: HashSet<String> = wanted.iter().map(|a| canonical_address(a)).collect();

        for addr in live.iter().filter(|a| !wanted_set.contains(&canonical_address(a))) {
            self.step(&self.jail.client, &["set", &self.jail.name, "delignoreip", addr])?;
        }
        for addr in wanted.iter().filter(|a| !live_set.contains(&canonical_address(a))) {
            self.step(&self.jail.client, &["set", &self.jail.name, "addignoreip", addr])?;
        }
        Ok(())
    }

    fn step(&self, program: &str, args: &[&str]) -> Result<()> {
        self.checked(program, args).map(|_| ())
    }

    fn checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let step = format!("{} {}", program, args.join(" "));
        let out = self
            .runner
            .run(program, args, self.timeout)
            .with_context(|| format!("Activation step '{}' could not run", step))?;
        if !out.success() {
            log::error!(
                "Activation step failed: step={:?} exit={:?} stdout={:?} stderr={:?}",
                step,
                out.code,
                out.stdout.trim(),
                out.stderr.trim()
            );
            return Err(WardenError::ActivationFailed {
                step,
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(out)
    }
}

/// `10.0.0.5/24` and `10.0.0.0/24` name the same network; IPv6 spellings collapse too.
/// Anything unparseable (a hostname) is compared verbatim.
pub fn canonical_address(addr: &str) -> String {
    if addr.contains('/') {
        if let Ok(net) = addr.parse::<IpNet>() {
            return net.trunc().to_string();
        }
    } else if let Ok(ip) = addr.parse::<IpAddr>() {
        return ip.to_string();
    }
    addr.to_string()
}

/// Parse `fail2ban-client get <jail> ignoreip`:
///
/// ```text
/// These IP addresses/networks are ignored:
/// |- 127.0.0.1/8
/// `- ::1
/// ```
///
/// or `No IP address/network is ignored`.
pub fn parse_ignore_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let item = line
                .trim_start_matches(|c: char| c == '|' || c == '`' || c == '-' || c.is_whitespace())
                .trim();
            let is_item = line.trim_start().starts_with("|-") || line.trim_start().starts_with("`-");
            (is_item && !item.is_empty()).then(|| item.to_string())
        })
        .collect()
}
