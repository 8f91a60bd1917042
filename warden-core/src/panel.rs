//! Operator-facing facade over the jail and the whitelist.
//!
//! Every action returns a [`Notice`] for the operator instead of an error, mirroring how the
//! admin UI reports outcomes. Whitelist mutations always change the table first and then sync.

use crate::actor::Actor;
use crate::config::WardenConfig;
use crate::confirm::UnbanAllToken;
use crate::errors::WardenError;
use crate::jail::{BanController, JailStatus, StatusCache};
use crate::privileged::PrivilegedRunner;
use crate::whitelist::entry::normalize_comment;
use crate::whitelist::{
    reconciler_from_config, validate_ip_or_cidr, NewWhitelistEntry, SqliteWhitelistStore,
    WhitelistDrift, WhitelistEntry, WhitelistReconciler, WhitelistStore,
};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use warden_hal::ProcessOps;

pub const AUTO_WHITELIST_COMMENT: &str = "Auto-whitelisted after unban";

const OUT_OF_SYNC_BODY: &str =
    "The database was updated but Fail2Ban may be out of sync. Check logs and run a manual whitelist sync.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Success => "ok",
            Severity::Warning => "warning",
            Severity::Danger => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Success, title, body)
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, body)
    }

    pub fn danger(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Danger, title, body)
    }

    fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.severity == Severity::Success
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.title)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

/// How `update_whitelist` treats the comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentChange<'a> {
    Keep,
    Set(&'a str),
    Clear,
}

pub struct AdminPanel {
    controller: BanController,
    cache: StatusCache,
    store: Arc<dyn WhitelistStore>,
    reconciler: WhitelistReconciler,
}

impl fmt::Debug for AdminPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminPanel")
            .field("controller", &self.controller)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl AdminPanel {
    pub fn new(
        controller: BanController,
        cache: StatusCache,
        store: Arc<dyn WhitelistStore>,
        reconciler: WhitelistReconciler,
    ) -> Self {
        Self {
            controller,
            cache,
            store,
            reconciler,
        }
    }

    /// Wire everything from config, opening the SQLite whitelist.
    pub fn from_config(cfg: &WardenConfig, hal: Arc<dyn ProcessOps>) -> Result<Self> {
        let store: Arc<dyn WhitelistStore> =
            Arc::new(SqliteWhitelistStore::open(&cfg.whitelist.database)?);
        Ok(Self::with_store(cfg, hal, store))
    }

    pub fn with_store(
        cfg: &WardenConfig,
        hal: Arc<dyn ProcessOps>,
        store: Arc<dyn WhitelistStore>,
    ) -> Self {
        let runner = PrivilegedRunner::from_config(hal, &cfg.privilege);
        let controller = BanController::new(runner.clone(), cfg.jail.clone());
        let reconciler = reconciler_from_config(cfg, store.clone(), runner);
        let cache = StatusCache::new(Duration::from_secs(cfg.cache.status_ttl_secs));
        Self::new(controller, cache, store, reconciler)
    }

    pub fn controller(&self) -> &BanController {
        &self.controller
    }

    pub fn reconciler(&self) -> &WhitelistReconciler {
        &self.reconciler
    }

    pub fn status(&self) -> Result<JailStatus> {
        self.cache.get_or_refresh(|| self.controller.get_status())
    }

    pub fn refresh_status(&self) -> Result<JailStatus> {
        self.cache.invalidate();
        self.status()
    }

    pub fn ban(&self, actor: &Actor, ip: &str) -> Notice {
        let ip = ip.trim();
        if ip.is_empty() {
            return Notice::warning("IP Required", "Please enter an IP address to ban.");
        }
        let ok = self.controller.ban_ip(actor, ip);
        self.cache.invalidate();
        if ok {
            Notice::success("IP Banned", format!("IP {} has been banned.", ip))
        } else {
            Notice::danger(
                "Failed to Ban IP",
                format!("Could not ban IP {}. Check logs for details.", ip),
            )
        }
    }

    /// Unban `ip`; with `whitelist` set, also add it to the whitelist once the unban succeeded.
    pub fn unban(
        &self,
        actor: &Actor,
        ip: &str,
        whitelist: bool,
        comment: Option<&str>,
    ) -> Vec<Notice> {
        let ip = ip.trim();
        if ip.is_empty() {
            return vec![Notice::warning(
                "IP Required",
                "Please enter an IP address to unban.",
            )];
        }
        let ok = self.controller.unban_ip(actor, ip);
        self.cache.invalidate();
        if !ok {
            return vec![Notice::danger(
                "Failed to Unban IP",
                format!("Could not unban IP {}. Check logs for details.", ip),
            )];
        }

        let mut notices = vec![Notice::success(
            "IP Unbanned",
            format!("IP {} has been unbanned successfully.", ip),
        )];
        if whitelist {
            notices.push(self.add_whitelist(
                actor,
                ip,
                Some(comment.unwrap_or(AUTO_WHITELIST_COMMENT)),
            ));
        }
        notices
    }

    pub fn unban_all(&self, actor: &Actor, token: UnbanAllToken) -> Notice {
        let ok = self.controller.unban_all(actor, token);
        self.cache.invalidate();
        if ok {
            Notice::success("All IPs Unbanned", "All banned IPs have been unbanned.")
        } else {
            Notice::danger(
                "Failed to Unban All",
                "Could not unban all IPs. Check logs for details.",
            )
        }
    }

    pub fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        self.store.list()
    }

    pub fn drift(&self) -> Result<WhitelistDrift> {
        self.reconciler.drift()
    }

    pub fn add_whitelist(&self, actor: &Actor, ip_or_cidr: &str, comment: Option<&str>) -> Notice {
        let entry = match NewWhitelistEntry::new(ip_or_cidr, comment, Some(actor.as_str())) {
            Ok(entry) => entry,
            Err(err) => return Notice::danger("Failed to Add to Whitelist", format!("{:#}", err)),
        };
        let created = match self.store.insert(entry) {
            Ok(created) => created,
            Err(err) => return Notice::danger("Failed to Add to Whitelist", format!("{:#}", err)),
        };
        log::info!(
            "Whitelist entry added: id={} ip={} user={}",
            created.id,
            created.ip_or_cidr,
            actor
        );
        self.after_change(
            "created",
            format!("IP {} has been added to whitelist.", created.ip_or_cidr),
        )
    }

    pub fn update_whitelist(
        &self,
        actor: &Actor,
        id: i64,
        ip_or_cidr: Option<&str>,
        comment: CommentChange<'_>,
    ) -> Notice {
        let result = (|| -> Result<WhitelistEntry> {
            let existing = self
                .store
                .get(id)?
                .ok_or_else(|| WardenError::EntryNotFound(id.to_string()))?;
            let address = match ip_or_cidr {
                Some(ip) => validate_ip_or_cidr(ip)?,
                None => existing.ip_or_cidr.clone(),
            };
            let comment = match comment {
                CommentChange::Keep => existing.comment.clone(),
                CommentChange::Set(text) => normalize_comment(Some(text))?,
                CommentChange::Clear => None,
            };
            self.store.update(id, &address, comment.as_deref())
        })();

        match result {
            Ok(updated) => {
                log::info!(
                    "Whitelist entry updated: id={} ip={} user={}",
                    updated.id,
                    updated.ip_or_cidr,
                    actor
                );
                self.after_change(
                    "updated",
                    format!("Whitelist entry {} is now {}.", updated.id, updated.ip_or_cidr),
                )
            }
            Err(err) => Notice::danger("Failed to Update Whitelist", format!("{:#}", err)),
        }
    }

    /// Remove by numeric id or by exact address.
    pub fn remove_whitelist(&self, actor: &Actor, target: &str) -> Notice {
        let target = target.trim();
        let result = (|| -> Result<WhitelistEntry> {
            let found = match target.parse::<i64>() {
                Ok(id) => self.store.get(id)?,
                Err(_) => self.store.find_by_address(&validate_ip_or_cidr(target)?)?,
            };
            let entry = found.ok_or_else(|| WardenError::EntryNotFound(target.to_string()))?;
            if !self.store.delete(entry.id)? {
                return Err(WardenError::EntryNotFound(target.to_string()).into());
            }
            Ok(entry)
        })();

        match result {
            Ok(removed) => {
                log::info!(
                    "Whitelist entry removed: id={} ip={} user={}",
                    removed.id,
                    removed.ip_or_cidr,
                    actor
                );
                self.after_change(
                    "removed",
                    format!("IP {} has been removed from whitelist.", removed.ip_or_cidr),
                )
            }
            Err(err) => Notice::danger("Failed to Remove from Whitelist", format!("{:#}", err)),
        }
    }

    pub fn sync_whitelist(&self) -> Notice {
        if self.reconciler.sync() {
            Notice::success("Sync successful", "Whitelist synced to Fail2Ban successfully.")
        } else {
            Notice::danger(
                "Sync failed",
                "Failed to sync whitelist to Fail2Ban. Check logs for details.",
            )
        }
    }

    fn after_change(&self, verb: &str, detail: String) -> Notice {
        if self.reconciler.sync() {
            Notice::success(
                "Whitelist synced",
                format!("{} Entry {} and synced to Fail2Ban.", detail, verb),
            )
        } else {
            Notice::warning("Sync failed", format!("{} {}", detail, OUT_OF_SYNC_BODY))
        }
    }
}
