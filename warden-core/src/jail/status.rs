//! Parsed `fail2ban-client status <jail>` snapshot.
//!
//! The client prints an ASCII tree, not a structured format:
//!
//! ```text
//! Status for the jail: opensips-brute-force
//! |- Filter
//! |  |- Currently failed: 2
//! |  |- Total failed:     17
//! |  `- File list:        /var/log/opensips.log
//! `- Actions
//!    |- Currently banned: 1
//!    |- Total banned:     4
//!    `- Banned IP list:   203.0.113.7
//! ```
//!
//! Any change in this layout is a breaking change for [`parse_status`].

use serde::{Deserialize, Serialize};

pub const SERVICE_DOWN_MESSAGE: &str =
    "Fail2ban service is not running. Start it with: sudo systemctl start fail2ban";

const BANNED_LIST_KEY: &str = "Banned IP list:";
const CURRENTLY_BANNED_KEY: &str = "Currently banned:";
const TOTAL_BANNED_KEY: &str = "Total banned:";
const CURRENTLY_FAILED_KEY: &str = "Currently failed:";
const TOTAL_FAILED_KEY: &str = "Total failed:";

/// Section markers whose presence means the client answered for an existing jail.
const STATUS_MARKERS: &[&str] = &[
    "status for the jail",
    "filter",
    "actions",
    "currently failed",
    "currently banned",
];

/// Socket error phrases printed by the client when the server is down.
const SOCKET_ERROR_PHRASES: &[&str] = &["Failed to access socket", "Is fail2ban running"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailStatus {
    pub jail_name: String,
    pub enabled: bool,
    pub service_running: bool,
    pub currently_failed: u64,
    pub total_failed: u64,
    pub currently_banned: u64,
    pub total_banned: u64,
    pub banned_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JailStatus {
    /// Degraded status for an unreachable fail2ban server.
    pub fn service_down(jail_name: &str) -> Self {
        Self {
            jail_name: jail_name.to_string(),
            enabled: false,
            service_running: false,
            currently_failed: 0,
            total_failed: 0,
            currently_banned: 0,
            total_banned: 0,
            banned_ips: Vec::new(),
            error: Some(SERVICE_DOWN_MESSAGE.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Parse successful `status <jail>` output. The service is known to be running at this point.
pub fn parse_status(jail_name: &str, output: &str) -> JailStatus {
    JailStatus {
        jail_name: jail_name.to_string(),
        enabled: infer_enabled(output),
        service_running: true,
        currently_failed: counter(output, CURRENTLY_FAILED_KEY),
        total_failed: counter(output, TOTAL_FAILED_KEY),
        currently_banned: counter(output, CURRENTLY_BANNED_KEY),
        total_banned: counter(output, TOTAL_BANNED_KEY),
        banned_ips: banned_ips(output),
        error: None,
    }
}

/// Heuristic: there is no explicit enabled flag in the protocol, so a jail counts as enabled
/// when the client answered with any recognizable status section.
pub fn infer_enabled(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    STATUS_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// True when client output says the control socket is unreachable (server down).
///
/// Keep every known phrasing here; this is the only place that needs to follow the client's
/// error text.
pub fn is_socket_unreachable(stderr: &str) -> bool {
    SOCKET_ERROR_PHRASES
        .iter()
        .any(|phrase| stderr.contains(phrase))
}

fn value_after<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output
        .lines()
        .find_map(|line| line.find(key).map(|idx| &line[idx + key.len()..]))
}

fn counter(output: &str, key: &str) -> u64 {
    value_after(output, key)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

fn banned_ips(output: &str) -> Vec<String> {
    value_after(output, BANNED_LIST_KEY)
        .map(|rest| rest.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Status for the jail: opensips-brute-force\n\
|- Filter\n\
|  |- Currently failed:\t2\n\
|  |- Total failed:\t17\n\
|  `- File list:\t/var/log/opensips.log\n\
`- Actions\n\
   |- Currently banned:\t3\n\
   |- Total banned:\t9\n\
   `- Banned IP list:\t203.0.113.7 198.51.100.23   2001:db8::1\n";

    #[test]
    fn parses_counters_and_ban_list_in_order() {
        let status = parse_status("opensips-brute-force", SAMPLE);
        assert!(status.enabled);
        assert!(status.service_running);
        assert_eq!(status.currently_failed, 2);
        assert_eq!(status.total_failed, 17);
        assert_eq!(status.currently_banned, 3);
        assert_eq!(status.total_banned, 9);
        assert_eq!(
            status.banned_ips,
            vec!["203.0.113.7", "198.51.100.23", "2001:db8::1"]
        );
        assert_eq!(status.error, None);
    }

    #[test]
    fn empty_ban_list_does_not_swallow_next_line() {
        let output = "Status for the jail: j\n`- Actions\n   `- Banned IP list:\t\n   |- Currently banned:\t0\n";
        let status = parse_status("j", output);
        assert!(status.banned_ips.is_empty());
    }

    #[test]
    fn missing_lines_default_to_zero_and_empty() {
        let status = parse_status("j", "Status for the jail: j\n");
        assert!(status.enabled);
        assert_eq!(status.currently_failed, 0);
        assert_eq!(status.total_failed, 0);
        assert_eq!(status.currently_banned, 0);
        assert_eq!(status.total_banned, 0);
        assert!(status.banned_ips.is_empty());
    }

    #[test]
    fn spaces_instead_of_tabs_are_accepted() {
        let status = parse_status("j", "`- Actions\n   |- Currently banned:    12\n");
        assert_eq!(status.currently_banned, 12);
    }

    #[test]
    fn output_without_markers_is_not_enabled() {
        assert!(!infer_enabled("OK\n"));
        assert!(!infer_enabled(""));
        assert!(infer_enabled("`- ACTIONS"));
    }

    #[test]
    fn socket_error_predicate() {
        assert!(is_socket_unreachable(
            "ERROR  Failed to access socket path: /var/run/fail2ban/fail2ban.sock. Is fail2ban running?"
        ));
        assert!(!is_socket_unreachable("Sorry but the jail 'x' does not exist"));
    }

    #[test]
    fn service_down_status_is_zeroed() {
        let status = JailStatus::service_down("j");
        assert!(!status.enabled);
        assert!(!status.service_running);
        assert!(status.banned_ips.is_empty());
        assert_eq!(status.total_banned, 0);
        assert!(status.is_degraded());
    }

    #[test]
    fn banned_list_length_matches_token_count() {
        for n in [1usize, 2, 5, 40] {
            let ips: Vec<String> = (0..n).map(|i| format!("10.0.{}.{}", i / 250, i % 250)).collect();
            let output = format!("`- Actions\n   `- Banned IP list:\t{}\n", ips.join(" "));
            assert_eq!(parse_status("j", &output).banned_ips, ips);
        }
    }
}
