//! Database-backed fail2ban whitelist and its reconciliation into the jail.

pub mod activation;
pub mod entry;
pub mod ignoreip;
pub mod patch;
pub mod reconciler;
pub mod script;
pub mod sqlite;
pub mod store;

pub use activation::Activator;
pub use entry::{validate_ip_or_cidr, NewWhitelistEntry, WhitelistEntry};
pub use patch::ConfigPatchBackend;
pub use reconciler::{SyncBackend, SyncReport, WhitelistDrift, WhitelistReconciler};
pub use script::ScriptBackend;
pub use sqlite::SqliteWhitelistStore;
pub use store::{MemoryWhitelistStore, WhitelistStore};

use crate::config::{SyncStrategy, WardenConfig};
use crate::privileged::PrivilegedRunner;
use std::sync::Arc;

/// Build the reconciler for the configured strategy.
pub fn reconciler_from_config(
    cfg: &WardenConfig,
    store: Arc<dyn WhitelistStore>,
    runner: PrivilegedRunner,
) -> WhitelistReconciler {
    let jail_config = cfg.jail_config_path();
    let backend: Box<dyn SyncBackend> = match cfg.whitelist.strategy {
        SyncStrategy::ConfigPatch => Box::new(ConfigPatchBackend::new(
            jail_config.clone(),
            cfg.whitelist.anchor_line(&cfg.jail.name),
            cfg.whitelist.annotate,
            Activator::new(
                runner,
                cfg.jail.clone(),
                cfg.whitelist.activation,
                cfg.whitelist.activation_timeout(),
            ),
        )),
        SyncStrategy::Script => Box::new(ScriptBackend::new(
            runner,
            cfg.script_override(),
            cfg.whitelist.script.clone(),
            cfg.whitelist.database.clone(),
        )),
    };
    let lock_file = cfg.whitelist.sync_lock_path(&cfg.jail.name);
    WhitelistReconciler::new(store, backend, jail_config).with_lock_file(Some(lock_file))
}
