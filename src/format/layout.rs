//! Frame geometry negotiated between sensor mode and receiver limits.

use super::code::FormatCode;
use serde::{Deserialize, Serialize};

/// Line stride must be a multiple of this many bytes.
pub const BYTES_PER_LINE_ALIGNMENT: u32 = 32;

/// The stride register is 16 bits wide.
pub const MAX_BYTES_PER_LINE: u32 = (1 << 16) - BYTES_PER_LINE_ALIGNMENT;

/// Worst case of four bytes per pixel; heights share the limit.
pub const MAX_WIDTH: u32 = MAX_BYTES_PER_LINE / 4;
/// Largest frame height.
pub const MAX_HEIGHT: u32 = MAX_WIDTH;

/// Smallest frame width.
pub const MIN_WIDTH: u32 = 16;
/// Smallest frame height.
pub const MIN_HEIGHT: u32 = 16;

/// A rectangle on the sensor pixel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge in pixels.
    pub left: u32,
    /// Top edge in pixels.
    pub top: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Builds a rectangle from its corner and size.
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// In-memory geometry of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Stride in bytes, padded to [`BYTES_PER_LINE_ALIGNMENT`].
    pub bytes_per_line: u32,
    /// Logical (unpacked) format of the buffer contents.
    pub format: FormatCode,
}

impl FrameLayout {
    /// Computes the layout for a negotiated sensor size.
    ///
    /// Dimensions are clamped to the receiver limits and the width is
    /// rounded down to a multiple of four.
    pub fn negotiate(width: u32, height: u32, format: FormatCode) -> Self {
        let width = width.clamp(MIN_WIDTH, MAX_WIDTH) & !3;
        let height = height.clamp(MIN_HEIGHT, MAX_HEIGHT);
        let bytes_per_line = align_up(
            width * format.bytes_per_sample(),
            BYTES_PER_LINE_ALIGNMENT,
        );

        Self {
            width,
            height,
            bytes_per_line,
            format,
        }
    }

    /// Builds a layout with an explicit stride.
    pub fn with_stride(width: u32, height: u32, bytes_per_line: u32, format: FormatCode) -> Self {
        Self {
            width,
            height,
            bytes_per_line,
            format,
        }
    }

    /// Bytes needed to hold one frame.
    #[inline]
    pub fn image_size(&self) -> usize {
        self.height as usize * self.bytes_per_line as usize
    }
}

/// Logical format description reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Stride in bytes.
    pub bytes_per_line: u32,
    /// Bits per sample.
    pub depth: u8,
    /// Bytes in one frame.
    pub image_size: usize,
    /// Analog crop on the sensor pixel array.
    pub crop: Rect,
    /// Bayer order and sample format.
    pub code: FormatCode,
}

impl FormatInfo {
    /// Describes `layout` captured from `crop`.
    pub fn new(layout: &FrameLayout, crop: Rect) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            bytes_per_line: layout.bytes_per_line,
            depth: layout.format.depth(),
            image_size: layout.image_size(),
            crop,
            code: layout.format,
        }
    }
}

#[inline]
const fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vga_10bit_layout() {
        let layout = FrameLayout::negotiate(640, 480, FormatCode::SRGGB10);
        assert_eq!(layout.bytes_per_line, 1280);
        assert_eq!(layout.image_size(), 1280 * 480);
    }

    #[test]
    fn test_stride_alignment() {
        let layout = FrameLayout::negotiate(1300, 100, FormatCode::SBGGR8);
        assert_eq!(layout.width, 1300);
        assert_eq!(layout.bytes_per_line, 1312);

        let layout = FrameLayout::negotiate(1296, 972, FormatCode::SGBRG10);
        assert_eq!(layout.bytes_per_line, 2592);
    }

    #[test]
    fn test_dimensions_clamped() {
        let layout = FrameLayout::negotiate(2, 3, FormatCode::SRGGB8);
        assert_eq!(layout.width, MIN_WIDTH);
        assert_eq!(layout.height, MIN_HEIGHT);

        let layout = FrameLayout::negotiate(1_000_000, 1_000_000, FormatCode::SRGGB8);
        assert_eq!(layout.width, MAX_WIDTH & !3);
        assert_eq!(layout.height, MAX_HEIGHT);
    }

    #[test]
    fn test_width_rounded_to_four() {
        let layout = FrameLayout::negotiate(642, 480, FormatCode::SRGGB8);
        assert_eq!(layout.width, 640);
    }

    #[test]
    fn test_format_info_from_layout() {
        let layout = FrameLayout::negotiate(640, 480, FormatCode::SGBRG10);
        let info = FormatInfo::new(&layout, Rect::new(16, 6, 2560, 1920));
        assert_eq!(info.depth, 10);
        assert_eq!(info.image_size, layout.image_size());
        assert_eq!(info.crop.width, 2560);
    }
}
