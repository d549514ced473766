//! CSI-2 receiver capture.
//!
//! [`CaptureEngine`] drives the receiver through [`ReceiverHardware`] and
//! fills the buffer ring from its interrupt handler. [`SimulatedReceiver`]
//! stands in for the silicon on hosts without one.

mod config;
mod engine;
mod hardware;
pub mod regs;
mod simulated;

pub use config::{CaptureConfig, ConfigError, FileConfig, OutputConfig, WhiteBalanceConfig};
pub use engine::{
    CaptureEngine, CaptureError, CaptureStats, DmaTarget, InterruptReport, RECEIVER_CLOCK_HZ,
    SCRATCH_SIZE,
};
pub use hardware::{DmaWindow, HardwareError, ReceiverHardware};
pub use simulated::{CacheEvent, SimulatedReceiver};
