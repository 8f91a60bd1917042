//! HAL trait definitions and implementations.
//!
//! This module defines the process execution trait and provides both the real
//! (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod linux_hal;
pub mod process_ops;

pub use fake_hal::{FakeHal, FakeResponse, Operation};
pub use linux_hal::LinuxHal;
pub use process_ops::{CommandOutput, ProcessOps};
