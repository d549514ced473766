//! DMA-capable frame buffer with capture metadata.

use crate::format::FrameLayout;
use std::sync::atomic::{fence, Ordering};
use thiserror::Error;

/// Errors from frame buffer allocation and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The allocator could not provide the memory.
    #[error("cannot allocate frame buffer of {size} bytes")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
    },
    /// The layout describes an empty image.
    #[error("frame buffer size must be non-zero")]
    ZeroSize,
    /// Supplied bytes do not match the layout.
    #[error("buffer holds {actual} bytes, layout needs {expected}")]
    SizeMismatch {
        /// Bytes the layout needs.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// Conversion output cannot hold the whole frame.
    #[error("output holds {actual} elements, frame needs {needed}")]
    OutputTooSmall {
        /// Elements the frame needs.
        needed: usize,
        /// Elements the output holds.
        actual: usize,
    },
}

/// Unity gain in Q16 fixed point.
pub const UNITY_GAIN: u32 = 1 << 16;

/// Initial sampling seed of a freshly allocated buffer.
pub(crate) const INITIAL_SEED: u32 = 1;

/// One captured frame.
///
/// The byte buffer is allocated once and reused for every frame that
/// passes through the same ring slot. Metadata (sequence, timestamp,
/// layout) is overwritten by the capture engine each time the buffer is
/// filled; the white-balance gains and sampling seed belong to the
/// application side and survive reuse.
pub struct FrameBuffer {
    data: Box<[u8]>,
    layout: FrameLayout,
    sequence: u32,
    timestamp: u64,
    /// R, G, B gains in Q16.
    pub(super) gains: [u32; 3],
    pub(super) seed: u32,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer large enough for `layout`.
    pub fn allocate(layout: &FrameLayout) -> Result<Self, BufferError> {
        let size = layout.image_size();
        if size == 0 {
            return Err(BufferError::ZeroSize);
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| BufferError::AllocationFailed { size })?;
        data.resize(size, 0);

        Ok(Self::with_data(data.into_boxed_slice(), *layout))
    }

    /// Wraps existing raw bytes, e.g. a frame loaded from disk or a
    /// synthetic test image.
    pub fn from_bytes(layout: FrameLayout, data: Vec<u8>) -> Result<Self, BufferError> {
        let expected = layout.image_size();
        if data.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self::with_data(data.into_boxed_slice(), layout))
    }

    fn with_data(data: Box<[u8]>, layout: FrameLayout) -> Self {
        Self {
            data,
            layout,
            sequence: 0,
            timestamp: 0,
            gains: [UNITY_GAIN; 3],
            seed: INITIAL_SEED,
        }
    }

    /// Raw frame bytes in the logical (unpacked) format.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Allocated size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length buffer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Address the DMA engine writes to.
    #[inline]
    pub fn dma_address(&self) -> usize {
        self.data.as_ptr() as usize
    }

    /// 0-based sequence number of the frame.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Receiver clock ticks at frame start.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Geometry and format the frame was captured with.
    #[inline]
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.layout.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.layout.height
    }

    /// Stride in bytes.
    #[inline]
    pub fn bytes_per_line(&self) -> u32 {
        self.layout.bytes_per_line
    }

    /// Current white-balance gains (R, G, B) in Q16.
    #[inline]
    pub fn gains(&self) -> [u32; 3] {
        self.gains
    }

    /// Overrides the white-balance gains (R, G, B) in Q16.
    pub fn set_gains(&mut self, gains: [u32; 3]) {
        self.gains = gains;
    }

    pub(crate) fn set_timestamp(&mut self, ticks: u64) {
        self.timestamp = ticks;
    }

    /// Records the frame identity once capture has completed.
    pub(crate) fn stamp(&mut self, sequence: u32, layout: &FrameLayout) {
        self.sequence = sequence;
        self.layout = *layout;
    }

    /// Orders CPU accesses against the device writing this memory.
    ///
    /// Cache maintenance over the buffer's range is the platform's job; the
    /// capture engine requests it through
    /// [`ReceiverHardware::clean_and_invalidate`](crate::capture::ReceiverHardware::clean_and_invalidate)
    /// before each DMA.
    #[inline]
    pub(crate) fn sync_for_device(&self) {
        fence(Ordering::SeqCst);
    }

    /// Makes device writes visible before the CPU reads the frame.
    #[inline]
    pub(crate) fn sync_for_cpu(&self) {
        fence(Ordering::SeqCst);
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.layout.width)
            .field("height", &self.layout.height)
            .field("format", &self.layout.format.to_string())
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}
