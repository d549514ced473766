//! Bayer demosaicing and RGB conversion.
//!
//! Interior pixels are reconstructed by bilinear interpolation over
//! same-colour neighbours. The one-pixel border has an incomplete
//! neighbourhood and decodes to black; there is no wraparound and no
//! extrapolation.

use super::frame::{BufferError, FrameBuffer};
use crate::format::ColorComponent;

/// Colour components of one pixel, each `depth` bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    /// Red.
    pub r: u16,
    /// Green.
    pub g: u16,
    /// Blue.
    pub b: u16,
}

impl Pixel {
    /// All channels zero, used for the frame border.
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    /// Builds a pixel from its channels.
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub(crate) fn channels(self) -> [u16; 3] {
        [self.r, self.g, self.b]
    }
}

/// Applies a Q16 gain, drops `shift` bits and saturates at `max`.
#[inline]
fn scale(value: u16, gain: u32, shift: u32, max: u32) -> u32 {
    let scaled = (u64::from(value) * u64::from(gain)) >> shift;
    scaled.min(u64::from(max)) as u32
}

impl FrameBuffer {
    /// Raw sample at (`x`, `y`), masked to the sample depth.
    ///
    /// Reads outside the buffer yield 0.
    pub fn sample(&self, x: u32, y: u32) -> u16 {
        let format = self.layout().format;
        let depth = format.depth();
        let row = y as usize * self.bytes_per_line() as usize;
        let bytes = self.as_bytes();
        let byte = |offset: usize| bytes.get(row + offset).copied().unwrap_or(0);

        let x = x as usize;
        let value = if depth <= 8 {
            u16::from(byte(x))
        } else if format.is_packed() {
            // Four pixels in five bytes: high bits first, then a byte with
            // the four 2-bit remainders.
            let group = x / 4 * 5;
            let lane = x % 4;
            let high = u16::from(byte(group + lane));
            let low = u16::from(byte(group + 4)) >> (lane * 2) & 0x03;
            high << 2 | low
        } else {
            u16::from_le_bytes([byte(2 * x), byte(2 * x + 1)])
        };

        value & ((1u16 << depth) - 1)
    }

    /// Decodes the pixel at (`x`, `y`) to its three colour components.
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let width = self.width();
        let height = self.height();
        if x == 0 || y == 0 || x >= width.saturating_sub(1) || y >= height.saturating_sub(1) {
            return Pixel::BLACK;
        }

        let s = |dx: i32, dy: i32| -> u32 {
            let nx = x.wrapping_add_signed(dx);
            let ny = y.wrapping_add_signed(dy);
            u32::from(self.sample(nx, ny))
        };

        let center = s(0, 0);
        let orthogonal = || (s(-1, 0) + s(1, 0) + s(0, -1) + s(0, 1)) / 4;
        let diagonal = || (s(-1, -1) + s(1, -1) + s(-1, 1) + s(1, 1)) / 4;
        let horizontal = || (s(-1, 0) + s(1, 0)) / 2;
        let vertical = || (s(0, -1) + s(0, 1)) / 2;

        let (r, g, b) = match self.layout().format.color_at(x, y) {
            ColorComponent::Red => (center, orthogonal(), diagonal()),
            ColorComponent::Blue => (diagonal(), orthogonal(), center),
            ColorComponent::GreenRed => (horizontal(), center, vertical()),
            ColorComponent::GreenBlue => (vertical(), center, horizontal()),
        };

        // Averages of depth-bit samples stay within depth bits.
        Pixel::new(r as u16, g as u16, b as u16)
    }

    /// Decodes and white-balances a pixel as `0x00RRGGBB`.
    pub fn pixel_rgb888(&self, x: u32, y: u32) -> u32 {
        let pixel = self.pixel(x, y);
        let shift = u32::from(self.layout().format.depth()) + 8;
        let [gr, gg, gb] = self.gains;

        scale(pixel.r, gr, shift, 0xFF) << 16
            | scale(pixel.g, gg, shift, 0xFF) << 8
            | scale(pixel.b, gb, shift, 0xFF)
    }

    /// Decodes and white-balances a pixel as RGB565, red in the top bits.
    pub fn pixel_rgb565(&self, x: u32, y: u32) -> u16 {
        let pixel = self.pixel(x, y);
        let depth = u32::from(self.layout().format.depth());
        let [gr, gg, gb] = self.gains;

        let r = scale(pixel.r, gr, depth + 11, 0x1F);
        let g = scale(pixel.g, gg, depth + 10, 0x3F);
        let b = scale(pixel.b, gb, depth + 11, 0x1F);

        (r << 11 | g << 5 | b) as u16
    }

    /// Converts the whole frame to packed R, G, B bytes in raster order.
    pub fn convert_to_rgb888(&self, out: &mut [u8]) -> Result<(), BufferError> {
        let needed = self.pixel_count() * 3;
        if out.len() < needed {
            return Err(BufferError::OutputTooSmall {
                needed,
                actual: out.len(),
            });
        }

        let width = self.width();
        for (i, rgb) in out[..needed].chunks_exact_mut(3).enumerate() {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            let value = self.pixel_rgb888(x, y);
            rgb[0] = (value >> 16) as u8;
            rgb[1] = (value >> 8) as u8;
            rgb[2] = value as u8;
        }

        Ok(())
    }

    /// Converts the whole frame to RGB565 words in raster order.
    pub fn convert_to_rgb565(&self, out: &mut [u16]) -> Result<(), BufferError> {
        let needed = self.pixel_count();
        if out.len() < needed {
            return Err(BufferError::OutputTooSmall {
                needed,
                actual: out.len(),
            });
        }

        let width = self.width();
        for (i, word) in out[..needed].iter_mut().enumerate() {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            *word = self.pixel_rgb565(x, y);
        }

        Ok(())
    }

    /// Convenience wrapper allocating the RGB888 output.
    pub fn to_rgb888(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.pixel_count() * 3];
        // The output is sized for the frame, so this cannot fail.
        let _ = self.convert_to_rgb888(&mut out);
        out
    }

    #[inline]
    fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::{FormatCode, FrameLayout};

    /// Fills every pixel with the constant of its Bayer position.
    pub(crate) fn flat_frame(
        width: u32,
        height: u32,
        format: FormatCode,
        [r, g, b]: [u16; 3],
    ) -> FrameBuffer {
        let layout = FrameLayout::negotiate(width, height, format);
        let mut buffer = FrameBuffer::allocate(&layout).unwrap();
        let bpl = layout.bytes_per_line as usize;
        let bytes = buffer.as_bytes_mut();

        for y in 0..layout.height {
            for x in 0..layout.width {
                let value = match format.color_at(x, y) {
                    ColorComponent::Red => r,
                    ColorComponent::GreenRed | ColorComponent::GreenBlue => g,
                    ColorComponent::Blue => b,
                };
                let offset = y as usize * bpl;
                if format.depth() > 8 {
                    let at = offset + 2 * x as usize;
                    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
                } else {
                    bytes[offset + x as usize] = value as u8;
                }
            }
        }

        buffer
    }

    #[test]
    fn test_border_is_black() {
        let frame = flat_frame(16, 16, FormatCode::SRGGB8, [200, 100, 50]);

        for i in 0..16 {
            assert_eq!(frame.pixel(0, i), Pixel::BLACK);
            assert_eq!(frame.pixel(15, i), Pixel::BLACK);
            assert_eq!(frame.pixel(i, 0), Pixel::BLACK);
            assert_eq!(frame.pixel(i, 15), Pixel::BLACK);
        }
    }

    #[test]
    fn test_flat_field_reproduced_exactly() {
        for format in [
            FormatCode::SRGGB8,
            FormatCode::SBGGR8,
            FormatCode::SGRBG10,
            FormatCode::SGBRG10,
        ] {
            let frame = flat_frame(16, 16, format, [200, 100, 50]);
            for y in 1..15 {
                for x in 1..15 {
                    assert_eq!(frame.pixel(x, y), Pixel::new(200, 100, 50), "{format} ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_neighbour_sets_by_position() {
        // 8-bit RGGB with every sample distinct so each average is checkable.
        let layout = FrameLayout::with_stride(4, 4, 4, FormatCode::SRGGB8);
        let data: Vec<u8> = (0..16).map(|i| i * 10).collect();
        let frame = FrameBuffer::from_bytes(layout, data).unwrap();
        // Row-major samples:
        //   0  10  20  30
        //  40  50  60  70
        //  80  90 100 110
        // 120 130 140 150

        // (1,1) is B: red = diagonals, green = orthogonals.
        assert_eq!(frame.pixel(1, 1), Pixel::new((0 + 20 + 80 + 100) / 4, (10 + 40 + 60 + 90) / 4, 50));
        // (2,1) is Gb: red = vertical, blue = horizontal.
        assert_eq!(frame.pixel(2, 1), Pixel::new((20 + 100) / 2, 60, (50 + 70) / 2));
        // (1,2) is Gr: red = horizontal, blue = vertical.
        assert_eq!(frame.pixel(1, 2), Pixel::new((80 + 100) / 2, 90, (50 + 130) / 2));
        // (2,2) is R: green = orthogonals, blue = diagonals.
        assert_eq!(
            frame.pixel(2, 2),
            Pixel::new(100, (60 + 90 + 110 + 140) / 4, (50 + 70 + 130 + 150) / 4)
        );
    }

    #[test]
    fn test_packed_samples() {
        // Pixels 0..4 = 0x3FF, 0x001, 0x200, 0x155
        let layout = FrameLayout::with_stride(4, 1, 32, FormatCode::SRGGB10P);
        let mut data = vec![0u8; 32];
        data[..5].copy_from_slice(&[0xFF, 0x00, 0x80, 0x55, 0b01_00_01_11]);
        let frame = FrameBuffer::from_bytes(layout, data).unwrap();

        assert_eq!(frame.sample(0, 0), 0x3FF);
        assert_eq!(frame.sample(1, 0), 0x001);
        assert_eq!(frame.sample(2, 0), 0x200);
        assert_eq!(frame.sample(3, 0), 0x155);
    }

    #[test]
    fn test_unpacked_10bit_masked() {
        let layout = FrameLayout::with_stride(2, 1, 32, FormatCode::SRGGB10);
        let mut data = vec![0u8; 32];
        data[..4].copy_from_slice(&[0xFF, 0xFF, 0x34, 0x01]);
        let frame = FrameBuffer::from_bytes(layout, data).unwrap();

        assert_eq!(frame.sample(0, 0), 0x3FF);
        assert_eq!(frame.sample(1, 0), 0x134);
    }

    #[test]
    fn test_rgb888_shifts_10bit_to_8bit() {
        let frame = flat_frame(16, 16, FormatCode::SRGGB10, [1023, 512, 4]);
        assert_eq!(frame.pixel_rgb888(4, 4), 0xFF << 16 | 0x80 << 8 | 0x01);
        assert_eq!(frame.pixel_rgb888(0, 4), 0);
    }

    #[test]
    fn test_rgb888_gain_saturates() {
        let mut frame = flat_frame(16, 16, FormatCode::SRGGB8, [200, 100, 50]);
        frame.set_gains([2 << 16, 1 << 16, 1 << 15]);
        assert_eq!(frame.pixel_rgb888(5, 5), 0xFF << 16 | 100 << 8 | 25);
    }

    #[test]
    fn test_rgb565_layout() {
        let frame = flat_frame(16, 16, FormatCode::SBGGR8, [255, 255, 0]);
        assert_eq!(frame.pixel_rgb565(3, 3), 0b11111_111111_00000);

        let frame = flat_frame(16, 16, FormatCode::SBGGR8, [0, 0, 255]);
        assert_eq!(frame.pixel_rgb565(3, 3), 0b00000_000000_11111);
    }

    #[test]
    fn test_convert_rgb888_raster_order() {
        let frame = flat_frame(16, 16, FormatCode::SGRBG8, [30, 60, 90]);
        let rgb = frame.to_rgb888();

        assert_eq!(rgb.len(), 16 * 16 * 3);
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        let at = (5 * 16 + 7) * 3;
        assert_eq!(&rgb[at..at + 3], &[30, 60, 90]);
    }

    #[test]
    fn test_convert_rejects_short_output() {
        let frame = flat_frame(16, 16, FormatCode::SRGGB8, [1, 1, 1]);
        let mut out = vec![0u16; 10];
        assert_eq!(
            frame.convert_to_rgb565(&mut out),
            Err(BufferError::OutputTooSmall {
                needed: 256,
                actual: 10
            })
        );
    }
}
