//! Delegating strategy: run the external whitelist sync script.
//!
//! The script owns the jail file grammar and the reload; we only locate it, hand it the
//! whitelist database and credentials through the environment, and judge its exit code.
//! `DB_NAME` is the SQLite file the admin panel writes to, so the script reads the same table.

use super::entry::WhitelistEntry;
use super::reconciler::{SyncBackend, SyncReport};
use crate::config::ScriptConfig;
use crate::errors::WardenError;
use crate::privileged::PrivilegedRunner;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScriptBackend {
    runner: PrivilegedRunner,
    override_path: Option<PathBuf>,
    cfg: ScriptConfig,
    database: PathBuf,
}

impl ScriptBackend {
    pub fn new(
        runner: PrivilegedRunner,
        override_path: Option<PathBuf>,
        cfg: ScriptConfig,
        database: PathBuf,
    ) -> Self {
        Self {
            runner,
            override_path,
            cfg,
            database,
        }
    }

    /// First existing candidate: the override, then the search list.
    pub fn locate(&self) -> Result<PathBuf> {
        locate_script(self.override_path.as_deref(), &self.cfg.search_paths)
    }
}

pub fn locate_script(override_path: Option<&Path>, search_paths: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        log::warn!(
            "sync script override {} does not exist, trying search paths",
            path.display()
        );
    }
    if let Some(found) = search_paths.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    let tried: Vec<String> = override_path
        .into_iter()
        .map(Path::to_path_buf)
        .chain(search_paths.iter().cloned())
        .map(|p| p.display().to_string())
        .collect();
    Err(WardenError::ScriptNotFound(tried.join(", ")).into())
}

impl SyncBackend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    fn apply(&self, entries: &[WhitelistEntry]) -> Result<SyncReport> {
        let script = self.locate()?;
        let script_str = script.to_string_lossy();
        let database = self.database.to_string_lossy();
        let env = [
            ("DB_NAME", database.as_ref()),
            ("DB_USER", self.cfg.db_user.as_str()),
            ("DB_PASS", self.cfg.db_pass.as_str()),
        ];

        let out = self
            .runner
            .run_with_env(&script_str, &[], &env, self.cfg.timeout())
            .with_context(|| format!("Failed to run whitelist sync script {}", script.display()))?;

        if !out.success() {
            log::error!(
                "Whitelist sync script failed: script_path={} exit={:?} stdout={:?} stderr={:?}",
                script.display(),
                out.code,
                out.stdout.trim(),
                out.stderr.trim()
            );
            return Err(WardenError::ScriptFailed {
                path: script.display().to_string(),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            }
            .into());
        }

        Ok(SyncReport {
            backend: self.name(),
            entries: entries.len(),
            config_changed: true,
            output: out.stdout.trim().to_string(),
        })
    }
}
