//! Hardware access seam for the CSI-2 receiver.
//!
//! The capture engine never touches MMIO directly. Everything it needs from
//! the platform (register access, the power domain, the receiver clock and
//! the bus-arbitration bracket) goes through [`ReceiverHardware`], so the
//! same engine drives real silicon or [`SimulatedReceiver`](super::SimulatedReceiver).

use super::regs;
use crate::format::FrameLayout;
use thiserror::Error;

/// Receiver bring-up failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// The power domain could not be switched on.
    #[error("receiver power domain did not respond")]
    Power,
    /// The receiver clock did not start.
    #[error("cannot start receiver clock at {rate_hz} Hz")]
    Clock {
        /// Requested rate.
        rate_hz: u32,
    },
    /// Any other platform failure.
    #[error("receiver not responding: {0}")]
    Receiver(String),
}

/// Address range the DMA engine writes the next frame into.
///
/// An empty window (`end == start`) points at the scratch area and keeps
/// the hardware running without storing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    /// First byte.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

impl DmaWindow {
    /// Window covering one frame at `start`.
    pub fn frame(start: usize, layout: &FrameLayout) -> Self {
        Self {
            start,
            end: start + layout.image_size(),
        }
    }

    /// Zero-length window over the scratch area.
    pub fn scratch(start: usize) -> Self {
        Self { start, end: start }
    }

    /// Window size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for the scratch window.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Low 32 bits of a CPU address.
#[inline]
pub(crate) fn low_bits(address: usize) -> u32 {
    (address as u64 & u64::from(u32::MAX)) as u32
}

/// Platform services the capture engine relies on.
///
/// Implementations must be usable from interrupt context: register access
/// and [`program_dma`](Self::program_dma) may not block.
pub trait ReceiverHardware {
    /// Reads a receiver register.
    fn read(&mut self, offset: u32) -> u32;

    /// Writes a receiver register.
    fn write(&mut self, offset: u32, value: u32);

    /// Switches the receiver power domain.
    fn set_power(&mut self, on: bool) -> Result<(), HardwareError>;

    /// Starts the receiver clock at `rate_hz`.
    fn start_clock(&mut self, rate_hz: u32) -> Result<(), HardwareError>;

    /// Stops the receiver clock.
    fn stop_clock(&mut self);

    /// Writes the lane clock gate register.
    fn gate_lane_clocks(&mut self, value: u32);

    /// Busy-waits for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Free-running tick counter used for frame timestamps.
    fn clock_ticks(&mut self) -> u64;

    /// Opens a peripheral access bracket.
    fn bus_enter(&mut self) {}

    /// Closes a peripheral access bracket.
    fn bus_exit(&mut self) {}

    /// Writes back and invalidates the data cache over `len` bytes at
    /// `start` before the DMA engine is pointed at them.
    ///
    /// Coherent targets keep the default, which does nothing.
    fn clean_and_invalidate(&mut self, _start: usize, _len: usize) {}

    /// Translates a CPU address into the address the DMA engine uses.
    ///
    /// The receiver has a 32-bit bus. The default is the identity for
    /// addresses below 4 GiB; anything higher cannot be reached by the DMA
    /// engine, so it is reported and only the low 32 bits are kept.
    /// Platforms with a bus offset override this with their own mapping.
    fn bus_address(&self, address: usize) -> u32 {
        u32::try_from(address).unwrap_or_else(|_| {
            tracing::warn!(address, "Address beyond the 32-bit DMA bus");
            low_bits(address)
        })
    }

    /// Points the DMA engine at `window`.
    fn program_dma(&mut self, window: DmaWindow) {
        let start = self.bus_address(window.start);
        let end = self.bus_address(window.end);
        self.write(regs::IBSA0, start);
        self.write(regs::IBEA0, end);
    }

    /// Called at frame end with the memory the last non-empty window
    /// covered.
    ///
    /// On real hardware the DMA engine has already filled it and this does
    /// nothing; simulated receivers write their frame here.
    fn complete_dma(&mut self, _layout: &FrameLayout, _target: &mut [u8]) {}

    /// Read-modify-write of one register field.
    fn write_field(&mut self, offset: u32, value: u32, mask: u32) {
        let mut register = self.read(offset);
        regs::set_field(&mut register, value, mask);
        self.write(offset, register);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatCode;

    #[test]
    fn test_frame_window_covers_image() {
        let layout = FrameLayout::negotiate(640, 480, FormatCode::SBGGR10);
        let window = DmaWindow::frame(0x4000_0000, &layout);
        assert_eq!(window.len(), 640 * 2 * 480);
        assert!(!window.is_empty());
        assert!(DmaWindow::scratch(0x1000).is_empty());
    }

    #[test]
    fn test_low_bits_of_bus_address() {
        assert_eq!(low_bits(0x4000_1000), 0x4000_1000);
        assert_eq!(low_bits(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(low_bits(0x1_2345_6789), 0x2345_6789);
    }
}
