use thiserror::Error;

/// Result type alias for warden operations
pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Missing --yes-i-know flag. Unbanning every address is irreversible!")]
    MissingYesIKnow,

    #[error("Invalid address {0:?}: expected an IPv4/IPv6 address or CIDR range (e.g. 192.168.1.100 or 192.168.1.0/24)")]
    InvalidAddress(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Whitelist entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Whitelist entry not found: {0}")]
    EntryNotFound(String),

    #[error("Failed to get Fail2Ban status (exit={code:?}): {stderr}")]
    StatusQueryFailed { code: Option<i32>, stderr: String },

    #[error("Activation step '{step}' failed (exit={code:?}): {stderr}")]
    ActivationFailed {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Whitelist sync script not found (tried: {0})")]
    ScriptNotFound(String),

    #[error("Whitelist sync script {path} failed (exit={code:?}): {stderr}")]
    ScriptFailed {
        path: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("No ignoreip directive and no anchor line {0:?} in jail config")]
    AnchorNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}
