//! Raw Bayer formats and frame geometry.
//!
//! A [`FormatCode`] says which colour sits at each position of the 2x2
//! Bayer tile, how deep the samples are and whether they are bit-packed.
//! A [`FrameLayout`] adds the width, height and padded stride of a buffer.

mod code;
mod layout;

pub use code::{ColorComponent, FormatCode, FormatError};
pub use layout::{
    FormatInfo, FrameLayout, Rect, BYTES_PER_LINE_ALIGNMENT, MAX_HEIGHT, MAX_WIDTH, MIN_HEIGHT,
    MIN_WIDTH,
};
