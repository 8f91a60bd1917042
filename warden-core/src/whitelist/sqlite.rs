//! SQLite-backed whitelist table.
//!
//! SQLx is async; warden operations are synchronous and request-scoped, so the store owns a
//! small tokio runtime and blocks on each query.

use super::entry::{NewWhitelistEntry, WhitelistEntry};
use super::store::WhitelistStore;
use crate::errors::WardenError;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Runtime;

type Row = (i64, String, Option<String>, Option<String>, i64, i64);

const SELECT_COLUMNS: &str =
    "SELECT id, ip_or_cidr, comment, created_by, created_at, updated_at FROM fail2ban_whitelist";

pub struct SqliteWhitelistStore {
    runtime: Runtime,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteWhitelistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWhitelistStore").finish_non_exhaustive()
    }
}

impl SqliteWhitelistStore {
    /// Connection acquire timeout - a locked database must not block a request forever.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (creating if missing) the database and apply embedded migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to start database runtime")?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = runtime
            .block_on(async {
                let pool = SqlitePoolOptions::new()
                    .max_connections(4)
                    .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .with_context(|| format!("Failed to open whitelist database: {}", path.display()))?;

        log::debug!("whitelist database ready: {}", path.display());
        Ok(Self { runtime, pool })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl Drop for SqliteWhitelistStore {
    fn drop(&mut self) {
        // Close connections while the runtime is still alive.
        self.runtime.block_on(self.pool.close());
    }
}

fn into_entry(row: Row) -> WhitelistEntry {
    let (id, ip_or_cidr, comment, created_by, created_at, updated_at) = row;
    WhitelistEntry {
        id,
        ip_or_cidr,
        comment,
        created_by,
        created_at,
        updated_at,
    }
}

fn map_unique(err: sqlx::Error, ip_or_cidr: &str) -> anyhow::Error {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return WardenError::DuplicateEntry(ip_or_cidr.to_string()).into();
        }
    }
    anyhow::Error::new(err).context("whitelist query failed")
}

impl WhitelistStore for SqliteWhitelistStore {
    fn list(&self) -> Result<Vec<WhitelistEntry>> {
        let query = format!("{} ORDER BY id ASC", SELECT_COLUMNS);
        let rows = self
            .block_on(sqlx::query_as::<_, Row>(&query).fetch_all(&self.pool))
            .context("Failed to list whitelist entries")?;
        Ok(rows.into_iter().map(into_entry).collect())
    }

    fn get(&self, id: i64) -> Result<Option<WhitelistEntry>> {
        let query = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = self
            .block_on(
                sqlx::query_as::<_, Row>(&query)
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .context("Failed to load whitelist entry")?;
        Ok(row.map(into_entry))
    }

    fn find_by_address(&self, ip_or_cidr: &str) -> Result<Option<WhitelistEntry>> {
        let query = format!("{} WHERE ip_or_cidr = ?", SELECT_COLUMNS);
        let row = self
            .block_on(
                sqlx::query_as::<_, Row>(&query)
                    .bind(ip_or_cidr)
                    .fetch_optional(&self.pool),
            )
            .context("Failed to look up whitelist entry")?;
        Ok(row.map(into_entry))
    }

    fn insert(&self, entry: NewWhitelistEntry) -> Result<WhitelistEntry> {
        let now = chrono::Utc::now().timestamp();
        let result = self
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO fail2ban_whitelist (ip_or_cidr, comment, created_by, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&entry.ip_or_cidr)
                .bind(&entry.comment)
                .bind(&entry.created_by)
                .bind(now)
                .bind(now)
                .execute(&self.pool),
            )
            .map_err(|e| map_unique(e, &entry.ip_or_cidr))?;

        Ok(WhitelistEntry {
            id: result.last_insert_rowid(),
            ip_or_cidr: entry.ip_or_cidr,
            comment: entry.comment,
            created_by: entry.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    fn update(&self, id: i64, ip_or_cidr: &str, comment: Option<&str>) -> Result<WhitelistEntry> {
        let now = chrono::Utc::now().timestamp();
        let result = self
            .block_on(
                sqlx::query(
                    "UPDATE fail2ban_whitelist SET ip_or_cidr = ?, comment = ?, updated_at = ? WHERE id = ?",
                )
                .bind(ip_or_cidr)
                .bind(comment)
                .bind(now)
                .bind(id)
                .execute(&self.pool),
            )
            .map_err(|e| map_unique(e, ip_or_cidr))?;

        if result.rows_affected() == 0 {
            return Err(WardenError::EntryNotFound(id.to_string()).into());
        }
        self.get(id)?
            .ok_or_else(|| WardenError::EntryNotFound(id.to_string()).into())
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let result = self
            .block_on(
                sqlx::query("DELETE FROM fail2ban_whitelist WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool),
            )
            .context("Failed to delete whitelist entry")?;
        Ok(result.rows_affected() > 0)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .block_on(
                sqlx::query_scalar("SELECT COUNT(*) FROM fail2ban_whitelist").fetch_one(&self.pool),
            )
            .context("Failed to count whitelist entries")?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn crud_roundtrip_through_sqlite() {
        let dir = tempdir().unwrap();
        let store = SqliteWhitelistStore::open(&dir.path().join("db/whitelist.db")).unwrap();

        let a = store
            .insert(NewWhitelistEntry::new("10.0.0.1", Some("office"), Some("alice")).unwrap())
            .unwrap();
        store
            .insert(NewWhitelistEntry::new("10.0.0.0/24", None, None).unwrap())
            .unwrap();

        let dup = store
            .insert(NewWhitelistEntry::new("10.0.0.1", None, None).unwrap())
            .unwrap_err();
        assert!(matches!(
            dup.downcast_ref::<WardenError>(),
            Some(WardenError::DuplicateEntry(_))
        ));

        let listed: Vec<_> = store.list().unwrap().into_iter().map(|e| e.ip_or_cidr).collect();
        assert_eq!(listed, vec!["10.0.0.1", "10.0.0.0/24"]);
        assert_eq!(store.count().unwrap(), 2);

        let updated = store.update(a.id, "10.0.0.5", None).unwrap();
        assert_eq!(updated.ip_or_cidr, "10.0.0.5");
        assert_eq!(updated.comment, None);
        assert_eq!(updated.created_by.as_deref(), Some("alice"));

        assert!(store.delete(a.id).unwrap());
        assert!(store.find_by_address("10.0.0.5").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn reopening_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("whitelist.db");
        {
            let store = SqliteWhitelistStore::open(&path).unwrap();
            store
                .insert(NewWhitelistEntry::new("::1", None, None).unwrap())
                .unwrap();
        }
        let store = SqliteWhitelistStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap()[0].ip_or_cidr, "::1");
    }
}
