//! Frame buffers and the pixel pipeline built on them.
//!
//! A [`FrameBuffer`] owns the raw Bayer bytes of one frame plus its
//! capture metadata. Decoding to RGB and white balance operate directly on
//! the buffer without intermediate copies.

mod decode;
mod frame;
mod white_balance;

pub use decode::Pixel;
pub use frame::{BufferError, FrameBuffer, UNITY_GAIN};
pub use white_balance::{Lcg, DEFAULT_SAMPLE_PIXELS, DEFAULT_SAMPLE_ROUNDS, LCG_MAX};
