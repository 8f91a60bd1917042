//! Fail2ban jail status and ban control.

pub mod cache;
pub mod controller;
pub mod status;

pub use cache::StatusCache;
pub use controller::BanController;
pub use status::{infer_enabled, is_socket_unreachable, parse_status, JailStatus};
