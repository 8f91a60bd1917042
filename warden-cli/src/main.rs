use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use warden_core::jail::JailStatus;
use warden_core::whitelist::WhitelistEntry;
use warden_core::{logging, Actor, AdminPanel, CommentChange, Notice, UnbanAllToken, WardenConfig};
use warden_hal::LinuxHal;

mod cli;

use cli::{Cli, Command, WhitelistCommand};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = WardenConfig::load_or_default(cli.config.as_deref())?;
    logging::init(cfg.logging.file.as_deref(), cli.verbose);
    let actor = cli.actor.map(Actor::new).unwrap_or_else(Actor::from_env);
    log::debug!("f2b-warden {} actor={} jail={}", env!("CARGO_PKG_VERSION"), actor, cfg.jail.name);

    // Checked before anything touches the jail or the database.
    let unban_all_token = match &cli.command {
        Command::UnbanAll { yes_i_know } => Some(UnbanAllToken::try_new(*yes_i_know)?),
        _ => None,
    };

    let panel = AdminPanel::from_config(&cfg, Arc::new(LinuxHal::new()))?;

    match cli.command {
        Command::Status { json } => {
            let status = panel.refresh_status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ban { ip } => Ok(report(&[panel.ban(&actor, &ip)])),
        Command::Unban {
            ip,
            whitelist,
            comment,
        } => Ok(report(&panel.unban(&actor, &ip, whitelist, comment.as_deref()))),
        Command::UnbanAll { .. } => {
            let token = unban_all_token.context("unban-all confirmation missing")?;
            Ok(report(&[panel.unban_all(&actor, token)]))
        }
        Command::Whitelist(cmd) => run_whitelist(&panel, &actor, cmd),
    }
}

fn run_whitelist(panel: &AdminPanel, actor: &Actor, cmd: WhitelistCommand) -> Result<ExitCode> {
    match cmd {
        WhitelistCommand::List { json } => {
            let entries = panel.list_whitelist()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_entries(&entries);
            }
            Ok(ExitCode::SUCCESS)
        }
        WhitelistCommand::Add {
            ip_or_cidr,
            comment,
        } => Ok(report(&[panel.add_whitelist(actor, &ip_or_cidr, comment.as_deref())])),
        WhitelistCommand::Edit {
            id,
            ip,
            comment,
            clear_comment,
        } => {
            let change = match (&comment, clear_comment) {
                (_, true) => CommentChange::Clear,
                (Some(text), false) => CommentChange::Set(text.as_str()),
                (None, false) => CommentChange::Keep,
            };
            Ok(report(&[panel.update_whitelist(actor, id, ip.as_deref(), change)]))
        }
        WhitelistCommand::Remove { target } => Ok(report(&[panel.remove_whitelist(actor, &target)])),
        WhitelistCommand::Sync => Ok(report(&[panel.sync_whitelist()])),
        WhitelistCommand::Diff { json } => {
            let drift = panel.drift()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&drift)?);
            } else if drift.is_in_sync() {
                println!("whitelist and jail config are in sync");
            } else {
                if !drift.directive_present {
                    println!("jail config has no ignoreip directive");
                }
                for addr in &drift.missing_from_config {
                    println!("+ {}", addr);
                }
                for addr in &drift.extra_in_config {
                    println!("- {}", addr);
                }
            }
            Ok(if drift.is_in_sync() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}

/// Print notices; any non-success outcome fails the process.
fn report(notices: &[Notice]) -> ExitCode {
    for notice in notices {
        if notice.is_success() {
            println!("{}", notice);
        } else {
            eprintln!("{}", notice);
        }
    }
    if notices.iter().all(Notice::is_success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_status(status: &JailStatus) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Jail:              {}", status.jail_name);
    println!("Service running:   {}", yes_no(status.service_running));
    println!("Enabled:           {}", yes_no(status.enabled));
    println!("Currently failed:  {}", status.currently_failed);
    println!("Total failed:      {}", status.total_failed);
    println!("Currently banned:  {}", status.currently_banned);
    println!("Total banned:      {}", status.total_banned);
    if let Some(error) = &status.error {
        println!("Error:             {}", error);
    }
    if status.banned_ips.is_empty() {
        println!("Banned IPs:        (none)");
    } else {
        println!("Banned IPs:");
        for ip in &status.banned_ips {
            println!("  {}", ip);
        }
    }
}

fn print_entries(entries: &[WhitelistEntry]) {
    if entries.is_empty() {
        println!("(whitelist is empty)");
        return;
    }
    println!("{:>5}  {:<45}  {:<12}  COMMENT", "ID", "ADDRESS", "CREATED BY");
    for e in entries {
        println!(
            "{:>5}  {:<45}  {:<12}  {}",
            e.id,
            e.ip_or_cidr,
            e.created_by.as_deref().unwrap_or("-"),
            e.comment.as_deref().unwrap_or("")
        );
    }
}
