//! Bayer format codes.

use std::fmt;
use thiserror::Error;

/// Errors from decoding a raw format code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Depth field is neither 8 nor 10.
    #[error("unsupported sample depth {0} (must be 8 or 10)")]
    UnsupportedDepth(u8),
}

/// Colour channel sampled at one position of the 2x2 Bayer tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorComponent {
    /// Red.
    Red = 0,
    /// Green sharing a row with red.
    GreenRed = 1,
    /// Green sharing a row with blue.
    GreenBlue = 2,
    /// Blue.
    Blue = 3,
}

impl ColorComponent {
    #[inline]
    const fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Red,
            1 => Self::GreenRed,
            2 => Self::GreenBlue,
            _ => Self::Blue,
        }
    }

    fn letter(self) -> char {
        match self {
            Self::Red => 'R',
            Self::GreenRed | Self::GreenBlue => 'G',
            Self::Blue => 'B',
        }
    }
}

/// Packed 16-bit description of a raw Bayer format.
///
/// ```text
/// bits  3:0   depth - 1
/// bits  5:4   colour at top-left
/// bits  7:6   colour at top-right
/// bits  9:8   colour at bottom-left
/// bits 11:10  colour at bottom-right
/// bit  12     samples are bit-packed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatCode(u16);

impl FormatCode {
    /// Builds a code from the four tile colours, the depth and the packed flag.
    pub const fn new(
        top_left: ColorComponent,
        top_right: ColorComponent,
        bottom_left: ColorComponent,
        bottom_right: ColorComponent,
        depth: u8,
        packed: bool,
    ) -> Self {
        Self(
            (depth as u16 - 1)
                | (top_left as u16) << 4
                | (top_right as u16) << 6
                | (bottom_left as u16) << 8
                | (bottom_right as u16) << 10
                | (packed as u16) << 12,
        )
    }

    /// No format negotiated.
    pub const UNKNOWN: Self = Self(0);

    /// 8-bit samples, one byte each.
    pub const SBGGR8: Self = Self::new(B, GB, GR, R, 8, false);
    /// GBRG order, 8-bit.
    pub const SGBRG8: Self = Self::new(GB, B, R, GR, 8, false);
    /// GRBG order, 8-bit.
    pub const SGRBG8: Self = Self::new(GR, R, B, GB, 8, false);
    /// RGGB order, 8-bit.
    pub const SRGGB8: Self = Self::new(R, GR, GB, B, 8, false);
    /// 10-bit samples, each occupying 16 bits.
    pub const SBGGR10: Self = Self::new(B, GB, GR, R, 10, false);
    /// GBRG order, 10-bit unpacked.
    pub const SGBRG10: Self = Self::new(GB, B, R, GR, 10, false);
    /// GRBG order, 10-bit unpacked.
    pub const SGRBG10: Self = Self::new(GR, R, B, GB, 10, false);
    /// RGGB order, 10-bit unpacked.
    pub const SRGGB10: Self = Self::new(R, GR, GB, B, 10, false);
    /// 10-bit samples packed four to five bytes.
    pub const SBGGR10P: Self = Self::new(B, GB, GR, R, 10, true);
    /// GBRG order, 10-bit packed.
    pub const SGBRG10P: Self = Self::new(GB, B, R, GR, 10, true);
    /// GRBG order, 10-bit packed.
    pub const SGRBG10P: Self = Self::new(GR, R, B, GB, 10, true);
    /// RGGB order, 10-bit packed.
    pub const SRGGB10P: Self = Self::new(R, GR, GB, B, 10, true);

    /// Wraps a raw code, validating its depth.
    pub fn from_raw(raw: u16) -> Result<Self, FormatError> {
        let code = Self(raw);
        match code.depth() {
            8 | 10 => Ok(code),
            depth => Err(FormatError::UnsupportedDepth(depth)),
        }
    }

    /// Returns the raw 16-bit value.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Sample bit depth.
    #[inline]
    pub const fn depth(self) -> u8 {
        (self.0 & 0x0F) as u8 + 1
    }

    /// Whether samples are packed four to five bytes.
    #[inline]
    pub const fn is_packed(self) -> bool {
        self.0 & (1 << 12) != 0
    }

    /// The same arrangement and depth without the packed flag.
    #[inline]
    pub const fn unpacked(self) -> Self {
        Self(self.0 & !(1 << 12))
    }

    /// The wire format carrying this arrangement bit-packed.
    #[inline]
    pub const fn packed(self) -> Self {
        Self(self.0 | (1 << 12))
    }

    /// Colour sampled at pixel (`x`, `y`); only the parity of each
    /// coordinate matters.
    #[inline]
    pub const fn color_at(self, x: u32, y: u32) -> ColorComponent {
        let quadrant = (x & 1) | (y & 1) << 1;
        ColorComponent::from_bits(self.0 >> ((quadrant << 1) + 4))
    }

    /// Bytes one sample occupies in an unpacked buffer.
    #[inline]
    pub const fn bytes_per_sample(self) -> u32 {
        if self.depth() > 8 {
            2
        } else {
            1
        }
    }
}

use ColorComponent::{Blue as B, GreenBlue as GB, GreenRed as GR, Red as R};

impl fmt::Display for FormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S{}{}{}{}{}",
            self.color_at(0, 0).letter(),
            self.color_at(1, 0).letter(),
            self.color_at(0, 1).letter(),
            self.color_at(1, 1).letter(),
            self.depth()
        )?;
        if self.is_packed() {
            f.write_str("P")?;
        }
        Ok(())
    }
}
