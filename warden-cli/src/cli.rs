//! CLI argument parsing for f2b-warden.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "f2b-warden")]
#[command(version)]
#[command(about = "Fail2Ban ban control and whitelist sync for the SBC admin host")]
#[command(long_about = "Fail2Ban ban control and whitelist sync for the SBC admin host\n\n\
    Reads and mutates the configured jail through fail2ban-client and keeps the jail's\n\
    ignoreip list in step with the whitelist database.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: $F2B_WARDEN_CONFIG, then /etc/f2b-warden/warden.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Operator name recorded in audit logs (default: $SUDO_USER, then $USER)
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show jail status and currently banned addresses
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ban an address manually
    Ban { ip: String },

    /// Lift the ban on one address
    Unban {
        ip: String,

        /// Also add the address to the whitelist
        #[arg(long)]
        whitelist: bool,

        /// Whitelist comment (with --whitelist)
        #[arg(long, requires = "whitelist")]
        comment: Option<String>,
    },

    /// Lift every ban in the jail (irreversible)
    UnbanAll {
        /// Confirm that every active ban should be dropped
        #[arg(long)]
        yes_i_know: bool,
    },

    /// Manage the whitelist
    #[command(subcommand)]
    Whitelist(WhitelistCommand),
}

#[derive(Debug, Subcommand)]
pub enum WhitelistCommand {
    /// List whitelist entries
    List {
        #[arg(long)]
        json: bool,
    },

    /// Add an address or CIDR range and sync
    Add {
        ip_or_cidr: String,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Change an entry and sync
    Edit {
        id: i64,

        /// New address or CIDR range
        #[arg(long)]
        ip: Option<String>,

        #[arg(long, conflicts_with = "clear_comment")]
        comment: Option<String>,

        #[arg(long)]
        clear_comment: bool,
    },

    /// Remove an entry by id or address and sync
    Remove { target: String },

    /// Push the whitelist into the jail config and activate it
    Sync,

    /// Compare the whitelist with the jail config
    Diff {
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "f2b-warden",
            "whitelist",
            "add",
            "10.0.0.0/24",
            "--comment",
            "office",
            "--actor",
            "alice",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.actor.as_deref(), Some("alice"));
        assert!(cli.verbose);
        match cli.command {
            Command::Whitelist(WhitelistCommand::Add { ip_or_cidr, comment }) => {
                assert_eq!(ip_or_cidr, "10.0.0.0/24");
                assert_eq!(comment.as_deref(), Some("office"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unban_comment_requires_whitelist() {
        assert!(Cli::try_parse_from(["f2b-warden", "unban", "10.0.0.1", "--comment", "x"]).is_err());
        assert!(Cli::try_parse_from([
            "f2b-warden",
            "unban",
            "10.0.0.1",
            "--whitelist",
            "--comment",
            "x"
        ])
        .is_ok());
    }

    #[test]
    fn edit_comment_flags_conflict() {
        assert!(Cli::try_parse_from([
            "f2b-warden",
            "whitelist",
            "edit",
            "3",
            "--comment",
            "x",
            "--clear-comment"
        ])
        .is_err());
    }

    #[test]
    fn unban_all_flag_is_parsed() {
        let cli = Cli::try_parse_from(["f2b-warden", "unban-all", "--yes-i-know"]).unwrap();
        assert!(matches!(cli.command, Command::UnbanAll { yes_i_know: true }));
    }
}
