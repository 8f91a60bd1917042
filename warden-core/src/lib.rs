//! f2b-warden core library.
//!
//! Reads and mutates one fail2ban jail through `fail2ban-client`, and keeps the jail's
//! `ignoreip` list in step with a database-backed whitelist.

pub mod actor;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod jail;
pub mod logging;
pub mod panel;
pub mod privileged;
pub mod whitelist;

pub use actor::Actor;
pub use config::WardenConfig;
pub use confirm::UnbanAllToken;
pub use errors::{Result, WardenError};
pub use panel::{AdminPanel, CommentChange, Notice, Severity};
pub use privileged::PrivilegedRunner;
