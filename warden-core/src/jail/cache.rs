//! Short-lived read-through cache for jail status.
//!
//! Status polls from several callers collapse into at most one `fail2ban-client status` per TTL.
//! The lock is held while refreshing, so concurrent callers wait for and share one query.

use super::status::JailStatus;
use anyhow::Result;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, JailStatus)>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached status if still fresh, otherwise run `load` and cache its success.
    pub fn get_or_refresh<F>(&self, load: F) -> Result<JailStatus>
    where
        F: FnOnce() -> Result<JailStatus>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, status)) = slot.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(status.clone());
            }
        }
        let status = load()?;
        *slot = Some((Instant::now(), status.clone()));
        Ok(status)
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
