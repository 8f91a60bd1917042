//! Whitelist reconciliation: table -> jail.
//!
//! `sync` is called from best-effort hooks after unrelated admin writes, so it reports through
//! a bool and the log and never lets an error (or panic) escape. Runs are serialized in-process
//! and, through the lock file, across processes.

use super::entry::WhitelistEntry;
use super::ignoreip::read_ignoreip;
use super::store::WhitelistStore;
use anyhow::{anyhow, Context, Result};
use nix::fcntl::{Flock, FlockArg};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One way of pushing the table into the jail. A deployment uses exactly one.
pub trait SyncBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Push `entries` into the jail and make them effective.
    fn apply(&self, entries: &[WhitelistEntry]) -> Result<SyncReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub backend: &'static str,
    pub entries: usize,
    pub config_changed: bool,
    /// Captured stdout of the script backend.
    pub output: String,
}

/// Table vs. jail config comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhitelistDrift {
    pub directive_present: bool,
    pub missing_from_config: Vec<String>,
    pub extra_in_config: Vec<String>,
}

impl WhitelistDrift {
    pub fn is_in_sync(&self) -> bool {
        self.directive_present
            && self.missing_from_config.is_empty()
            && self.extra_in_config.is_empty()
    }
}

pub struct WhitelistReconciler {
    store: Arc<dyn WhitelistStore>,
    backend: Box<dyn SyncBackend>,
    jail_config: PathBuf,
    lock_file: Option<PathBuf>,
    guard: Mutex<()>,
}

impl std::fmt::Debug for WhitelistReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistReconciler")
            .field("backend", &self.backend.name())
            .field("jail_config", &self.jail_config)
            .field("lock_file", &self.lock_file)
            .finish_non_exhaustive()
    }
}

impl WhitelistReconciler {
    pub fn new(
        store: Arc<dyn WhitelistStore>,
        backend: Box<dyn SyncBackend>,
        jail_config: PathBuf,
    ) -> Self {
        Self {
            store,
            backend,
            jail_config,
            lock_file: None,
            guard: Mutex::new(()),
        }
    }

    pub fn with_lock_file(mut self, lock_file: Option<PathBuf>) -> Self {
        self.lock_file = lock_file;
        self
    }

    /// Make the jail's ignore list match the table. True only if fetch, config mutation and
    /// activation all succeeded.
    pub fn sync(&self) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_sync())) {
            Ok(Ok(report)) => {
                log::info!(
                    "Fail2Ban whitelist synced: backend={} ip_count={} config_changed={} output={:?}",
                    report.backend,
                    report.entries,
                    report.config_changed,
                    report.output
                );
                true
            }
            Ok(Err(err)) => {
                log::error!(
                    "Failed to sync Fail2Ban whitelist: backend={} error={:#}",
                    self.backend.name(),
                    err
                );
                log::debug!("sync failure detail: {:?}", err);
                false
            }
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!(
                    "Whitelist sync panicked: {}\n{}",
                    msg,
                    std::backtrace::Backtrace::force_capture()
                );
                false
            }
        }
    }

    /// Same pipeline as [`sync`](Self::sync), with the failure as an error.
    pub fn try_sync(&self) -> Result<SyncReport> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _flock = match self.lock_file.as_deref() {
            Some(path) => Some(lock_exclusive(path)?),
            None => None,
        };

        let entries = self
            .store
            .list()
            .context("Failed to fetch whitelist from database")?;
        self.backend.apply(&entries)
    }

    /// Addresses in the jail config's `ignoreip` right now. A missing file or directive reads
    /// as empty.
    pub fn current_config_whitelist(&self) -> Result<Vec<String>> {
        Ok(self.read_config_directive()?.unwrap_or_default())
    }

    pub fn drift(&self) -> Result<WhitelistDrift> {
        let configured = self.read_config_directive()?;
        let table: Vec<String> = self
            .store
            .list()?
            .into_iter()
            .map(|e| e.ip_or_cidr)
            .collect();

        let directive_present = configured.is_some();
        let configured = configured.unwrap_or_default();
        let configured_set: HashSet<&str> = configured.iter().map(String::as_str).collect();
        let table_set: HashSet<&str> = table.iter().map(String::as_str).collect();

        Ok(WhitelistDrift {
            directive_present,
            missing_from_config: table
                .iter()
                .filter(|a| !configured_set.contains(a.as_str()))
                .cloned()
                .collect(),
            extra_in_config: configured
                .iter()
                .filter(|a| !table_set.contains(a.as_str()))
                .cloned()
                .collect(),
        })
    }

    fn read_config_directive(&self) -> Result<Option<Vec<String>>> {
        match std::fs::read_to_string(&self.jail_config) {
            Ok(content) => Ok(read_ignoreip(&content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to read jail config: {}", self.jail_config.display())
            }),
        }
    }
}

fn lock_exclusive(path: &Path) -> Result<Flock<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open sync lock file: {}", path.display()))?;
    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| anyhow!("Failed to lock {}: {}", path.display(), errno))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::entry::NewWhitelistEntry;
    use crate::whitelist::store::MemoryWhitelistStore;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
        fail: bool,
        panic: bool,
    }

    struct RecordingBackend(Arc<Recording>);

    impl SyncBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn apply(&self, entries: &[WhitelistEntry]) -> Result<SyncReport> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            if self.0.panic {
                panic!("backend exploded");
            }
            if self.0.fail {
                anyhow::bail!("restart failed");
            }
            self.0
                .seen
                .lock()
                .unwrap()
                .push(entries.iter().map(|e| e.ip_or_cidr.clone()).collect());
            Ok(SyncReport {
                backend: "recording",
                entries: entries.len(),
                config_changed: true,
                output: String::new(),
            })
        }
    }

    fn store_with(addrs: &[&str]) -> Arc<MemoryWhitelistStore> {
        let store = Arc::new(MemoryWhitelistStore::new());
        for a in addrs {
            store
                .insert(NewWhitelistEntry::new(a, None, Some("admin")).unwrap())
                .unwrap();
        }
        store
    }

    fn reconciler(
        store: Arc<MemoryWhitelistStore>,
        rec: Arc<Recording>,
        jail_config: PathBuf,
    ) -> WhitelistReconciler {
        WhitelistReconciler::new(store, Box::new(RecordingBackend(rec)), jail_config)
    }

    #[test]
    fn sync_passes_table_rows_in_order() {
        let rec = Arc::new(Recording::default());
        let r = reconciler(
            store_with(&["10.0.0.1", "192.168.1.0/24"]),
            rec.clone(),
            PathBuf::from("/nonexistent"),
        );
        assert!(r.sync());
        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![vec!["10.0.0.1".to_string(), "192.168.1.0/24".to_string()]]
        );
    }

    #[test]
    fn backend_error_becomes_false() {
        let rec = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let r = reconciler(store_with(&[]), rec.clone(), PathBuf::from("/nonexistent"));
        assert!(!r.sync());
        assert!(r.try_sync().is_err());
    }

    #[test]
    fn backend_panic_becomes_false_and_unlocks() {
        let rec = Arc::new(Recording {
            panic: true,
            ..Default::default()
        });
        let r = reconciler(store_with(&[]), rec.clone(), PathBuf::from("/nonexistent"));
        assert!(!r.sync());
        assert!(!r.sync());
        assert_eq!(rec.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lock_file_is_created_and_released() {
        let dir = tempdir().unwrap();
        let lock = dir.path().join("sync.lock");
        let rec = Arc::new(Recording::default());
        let r = reconciler(store_with(&["10.0.0.1"]), rec, dir.path().join("jail.conf"))
            .with_lock_file(Some(lock.clone()));
        assert!(r.sync());
        assert!(r.sync());
        assert!(lock.exists());
    }

    #[test]
    fn lock_file_parent_is_created() {
        let dir = tempdir().unwrap();
        let lock = dir.path().join("run/f2b-warden/sync.lock");
        let r = reconciler(
            store_with(&[]),
            Arc::new(Recording::default()),
            dir.path().join("jail.conf"),
        )
        .with_lock_file(Some(lock.clone()));
        assert!(r.sync());
        assert!(lock.exists());
    }

    #[test]
    fn drift_compares_table_and_file() {
        let dir = tempdir().unwrap();
        let conf = dir.path().join("jail.conf");
        let r = reconciler(
            store_with(&["10.0.0.1", "10.0.0.2"]),
            Arc::new(Recording::default()),
            conf.clone(),
        );

        let missing_file = r.drift().unwrap();
        assert!(!missing_file.directive_present);
        assert!(!missing_file.is_in_sync());
        assert!(r.current_config_whitelist().unwrap().is_empty());

        fs::write(&conf, "[jail]\nignoreip = 10.0.0.1 203.0.113.5\n").unwrap();
        let drift = r.drift().unwrap();
        assert!(drift.directive_present);
        assert_eq!(drift.missing_from_config, vec!["10.0.0.2"]);
        assert_eq!(drift.extra_in_config, vec!["203.0.113.5"]);

        fs::write(&conf, "[jail]\nignoreip = 10.0.0.1 10.0.0.2\n").unwrap();
        assert!(r.drift().unwrap().is_in_sync());
    }
}
