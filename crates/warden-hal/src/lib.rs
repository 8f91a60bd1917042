//! f2b-warden process abstraction layer (HAL).
//!
//! Everything that spawns an external program goes through [`ProcessOps`] so the
//! jail controller and whitelist reconciler can be exercised against [`FakeHal`]
//! without touching a real fail2ban install.

pub mod hal;

pub use hal::{CommandOutput, FakeHal, FakeResponse, LinuxHal, Operation, ProcessOps};
pub use warden_error::{HalError, HalResult};
