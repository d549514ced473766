//! Bayer Capture Library
//!
//! Interrupt-driven frame capture from a CSI-2 camera receiver into a
//! lock-free ring of frame buffers, with software demosaicing of the raw
//! Bayer data.
//!
//! # Architecture
//!
//! ```text
//! sensor ──CSI-2──> receiver ──DMA──> FrameBuffer
//!                      │ IRQ              │
//!               CaptureEngine ──publish──> ring ──> Consumer ──> RGB888 / RGB565
//! ```
//!
//! - [`sensor`]: chip drivers behind the [`SensorDriver`](sensor::SensorDriver) trait
//! - [`capture`]: receiver bring-up and the interrupt state machine
//! - [`ring`]: single-producer/single-consumer buffer ring
//! - [`buffer`]: frame memory, pixel decoding and white balance
//! - [`control`], [`format`]: controls and raw format descriptions
//!
//! # Example
//!
//! ```no_run
//! use bayer_capture::{
//!     capture::{CaptureConfig, SimulatedReceiver},
//!     context::CameraContext,
//!     sensor::RegisterFile,
//! };
//!
//! let mut camera = CameraContext::probe(SimulatedReceiver::new(), RegisterFile::new).unwrap();
//! let mut frames = CaptureConfig::default().apply(&mut camera).unwrap();
//! camera.start().unwrap();
//!
//! // ... the platform calls camera.handle_interrupt() from the receiver IRQ ...
//!
//! if let Some(frame) = frames.try_acquire_ready() {
//!     frame.white_balance(50, 10);
//!     let rgb = frame.to_rgb888();
//!     println!("frame {} ({} pixels)", frame.sequence(), rgb.len());
//! }
//! frames.release();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod capture;
pub mod context;
pub mod control;
pub mod format;
pub mod metrics;
pub mod ring;
pub mod sensor;

// Re-export commonly used types at crate root
pub use buffer::{FrameBuffer, Pixel};
pub use capture::{CaptureConfig, CaptureEngine, CaptureError, ReceiverHardware};
pub use context::CameraContext;
pub use control::{Control, ControlInfo};
pub use format::{FormatCode, FormatInfo};
pub use ring::{BufferRing, Consumer, Producer};
pub use sensor::{Sensor, SensorDriver};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
