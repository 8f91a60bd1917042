//! Whitelist persistence.
//!
//! The table is the source of truth; the jail config is derived from it on every sync.

use super::entry::{NewWhitelistEntry, WhitelistEntry};
use crate::errors::WardenError;
use anyhow::Result;
use std::sync::Mutex;

/// Storage for whitelist rows. `list` returns rows in insertion (id) order, which is also the
/// order they appear in `ignoreip`.
pub trait WhitelistStore: Send + Sync {
    fn list(&self) -> Result<Vec<WhitelistEntry>>;

    fn get(&self, id: i64) -> Result<Option<WhitelistEntry>>;

    fn find_by_address(&self, ip_or_cidr: &str) -> Result<Option<WhitelistEntry>>;

    /// Fails with [`WardenError::DuplicateEntry`] when the address already exists.
    fn insert(&self, entry: NewWhitelistEntry) -> Result<WhitelistEntry>;

    /// Replace address and comment of an existing row.
    fn update(&self, id: i64, ip_or_cidr: &str, comment: Option<&str>) -> Result<WhitelistEntry>;

    /// Returns false when no row had that id.
    fn delete(&self, id: i64) -> Result<bool>;

    fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<WhitelistEntry>,
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryWhitelistStore {
    state: Mutex<MemoryState>,
}

impl MemoryWhitelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WhitelistStore for MemoryWhitelistStore {
    fn list(&self) -> Result<Vec<WhitelistEntry>> {
        Ok(self.lock().rows.clone())
    }

    fn get(&self, id: i64) -> Result<Option<WhitelistEntry>> {
        Ok(self.lock().rows.iter().find(|r| r.id == id).cloned())
    }

    fn find_by_address(&self, ip_or_cidr: &str) -> Result<Option<WhitelistEntry>> {
        Ok(self
            .lock()
            .rows
            .iter()
            .find(|r| r.ip_or_cidr == ip_or_cidr)
            .cloned())
    }

    fn insert(&self, entry: NewWhitelistEntry) -> Result<WhitelistEntry> {
        let mut state = self.lock();
        if state.rows.iter().any(|r| r.ip_or_cidr == entry.ip_or_cidr) {
            return Err(WardenError::DuplicateEntry(entry.ip_or_cidr).into());
        }
        state.next_id += 1;
        let now = chrono::Utc::now().timestamp();
        let row = WhitelistEntry {
            id: state.next_id,
            ip_or_cidr: entry.ip_or_cidr,
            comment: entry.comment,
            created_by: entry.created_by,
            created_at: now,
            updated_at: now,
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, id: i64, ip_or_cidr: &str, comment: Option<&str>) -> Result<WhitelistEntry> {
        let mut state = self.lock();
        if state
            .rows
            .iter()
            .any(|r| r.id != id && r.ip_or_cidr == ip_or_cidr)
        {
            return Err(WardenError::DuplicateEntry(ip_or_cidr.to_string()).into());
        }
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| WardenError::EntryNotFound(id.to_string()))?;
        row.ip_or_cidr = ip_or_cidr.to_string();
        row.comment = comment.map(str::to_string);
        row.updated_at = chrono::Utc::now().timestamp();
        Ok(row.clone())
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let mut state = self.lock();
        let before = state.rows.len();
        state.rows.retain(|r| r.id != id);
        Ok(state.rows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(ip: &str, comment: Option<&str>) -> NewWhitelistEntry {
        NewWhitelistEntry::new(ip, comment, Some("alice")).unwrap()
    }

    #[test]
    fn insert_list_preserves_order_and_rejects_duplicates() {
        let store = MemoryWhitelistStore::new();
        store.insert(new_entry("10.0.0.1", Some("office"))).unwrap();
        store.insert(new_entry("10.0.0.0/24", None)).unwrap();

        let err = store.insert(new_entry("10.0.0.1", None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WardenError>(),
            Some(WardenError::DuplicateEntry(_))
        ));

        let addrs: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.ip_or_cidr)
            .collect();
        assert_eq!(addrs, vec!["10.0.0.1", "10.0.0.0/24"]);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn update_and_delete() {
        let store = MemoryWhitelistStore::new();
        let a = store.insert(new_entry("10.0.0.1", None)).unwrap();
        let b = store.insert(new_entry("10.0.0.2", None)).unwrap();

        assert!(store.update(b.id, "10.0.0.1", None).is_err());
        let updated = store.update(a.id, "10.0.0.9", Some("moved")).unwrap();
        assert_eq!(updated.ip_or_cidr, "10.0.0.9");
        assert_eq!(updated.comment.as_deref(), Some("moved"));
        assert!(store.find_by_address("10.0.0.9").unwrap().is_some());

        assert!(store.delete(a.id).unwrap());
        assert!(!store.delete(a.id).unwrap());
        assert!(store.get(a.id).unwrap().is_none());
        assert!(store.update(a.id, "10.0.0.3", None).is_err());
    }
}
