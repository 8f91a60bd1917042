//! Operator identity attached to audit log lines and whitelist rows.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The invoking operator: `SUDO_USER` first (the human behind sudo), then `USER`.
    pub fn from_env() -> Self {
        std::env::var("SUDO_USER")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|v| !v.is_empty()))
            .map(Self)
            .unwrap_or_else(Self::system)
    }

    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
