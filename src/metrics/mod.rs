//! Prometheus metrics for the capture pipeline.
//!
//! Counters are copied out of the engine in task context through a
//! [`MetricsSnapshot`]; nothing here runs on the interrupt path.
//!
//! # Metrics Exposed
//!
//! - `bayer_capture_frames_published_total` - Frames delivered to the consumer
//! - `bayer_capture_frames_dropped_total` - Frames captured into scratch
//! - `bayer_capture_spurious_interrupts_total` - Interrupts with nothing pending
//! - `bayer_capture_last_sequence` - Sequence number of the last consumed frame
//! - `bayer_capture_ring_ready` - Frames waiting for the consumer
//! - `bayer_capture_ring_capacity` - Usable ring slots
//! - `bayer_capture_wb_gain{channel}` - White-balance gain per channel
//!
//! # Example
//!
//! ```no_run
//! use bayer_capture::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     frames_published: 120,
//!     frames_dropped: 2,
//!     ring_ready: 1,
//!     ring_capacity: 3,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
