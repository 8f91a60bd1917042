//! In-process strategy: rewrite `ignoreip` in the jail file, then activate.

use super::activation::Activator;
use super::entry::WhitelistEntry;
use super::ignoreip::{apply_ignoreip, PatchOptions};
use super::reconciler::{SyncBackend, SyncReport};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigPatchBackend {
    jail_config: PathBuf,
    anchor: String,
    annotate: bool,
    activator: Activator,
}

impl ConfigPatchBackend {
    pub fn new(
        jail_config: PathBuf,
        anchor: String,
        annotate: bool,
        activator: Activator,
    ) -> Self {
        Self {
            jail_config,
            anchor,
            annotate,
            activator,
        }
    }
}

impl SyncBackend for ConfigPatchBackend {
    fn name(&self) -> &'static str {
        "config-patch"
    }

    fn apply(&self, entries: &[WhitelistEntry]) -> Result<SyncReport> {
        let path = &self.jail_config;
        let current = fs::read_to_string(path)
            .with_context(|| format!("Failed to read jail config: {}", path.display()))?;

        let patched = apply_ignoreip(
            &current,
            entries,
            &PatchOptions {
                anchor: &self.anchor,
                annotate: self.annotate,
            },
        )
        .with_context(|| format!("Failed to patch jail config: {}", path.display()))?;

        let changed = patched != current;
        if changed {
            write_atomic(path, &patched)?;
            log::debug!("jail config rewritten: {}", path.display());
        }

        // Activate even when the file is unchanged: a previous run may have written it and
        // then failed to restart.
        self.activator.activate(entries)?;

        Ok(SyncReport {
            backend: self.name(),
            entries: entries.len(),
            config_changed: changed,
            output: String::new(),
        })
    }
}

/// Replace `path` via a uniquely named temp file in the same directory, keeping the original
/// permissions. fail2ban only reads `*.conf` and `*.local` from jail.d, so the temp file is
/// never picked up.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path).map(|m| m.permissions()).ok();

    let mut tmp = tempfile::Builder::new()
        .prefix(".f2b-warden-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temp jail config in {}", parent.display()))?;
    tmp.write_all(content.as_bytes())
        .context("Failed to write jail config")?;
    tmp.as_file()
        .sync_all()
        .context("Failed to flush jail config")?;

    if let Some(permissions) = permissions {
        if let Err(err) = tmp.as_file().set_permissions(permissions) {
            log::warn!(
                "could not copy permissions to {}: {}",
                tmp.path().display(),
                err
            );
        }
    }

    tmp.persist(path).map_err(|e| e.error).with_context(|| {
        format!("Failed to atomically replace jail config: {}", path.display())
    })?;

    if let Ok(dir) = File::open(parent) {
        dir.sync_all().ok();
    }
    Ok(())
}
