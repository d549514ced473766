//! Lock-free single-producer/single-consumer ring of frame buffers.
//!
//! The ring holds `N` buffer slots and two cursors taken modulo `N`:
//! `in`, advanced by the producer on publish, and `out`, advanced by the
//! consumer on release. Slots in `[out, in)` are ready for the consumer;
//! all others belong to the producer. One slot is always sacrificed to tell
//! a full ring from an empty one, so at most `N - 1` buffers are ready or
//! in flight at any time.
//!
//! Ownership of the two ends is split by construction: [`BufferRing::allocate`]
//! hands out exactly one [`Producer`] and one [`Consumer`]. The producer only
//! ever touches slot `in`, the consumer only slot `out`. A buffer leaves the
//! producer side as a [`FreeBuffer`] tied to its ring and slot, and only that
//! token is accepted back.
//!
//! # Memory ordering
//!
//! ```text
//! producer                         consumer
//!   fill slot[in]                    load in   (Acquire)
//!   store in+1   (Release)   --->    read slot[out]
//!   load out     (Acquire)   <---    store out+1 (Release)
//! ```

#![allow(unsafe_code)]

mod consumer;
mod producer;

pub use consumer::Consumer;
pub use producer::{FreeBuffer, Producer, ReadyHandler};

use crate::buffer::{BufferError, FrameBuffer};
use crate::format::FrameLayout;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Fewest slots a ring may have.
pub const MIN_BUFFERS: usize = 3;
/// Most slots a ring may have.
pub const MAX_BUFFERS: usize = 20;

/// Errors from filling the buffer pool.
#[derive(Debug, Error)]
pub enum RingError {
    /// A buffer could not be allocated; none are kept.
    #[error("failed to allocate buffer {index} of {count}: {source}")]
    Allocation {
        /// Buffer that failed.
        index: usize,
        /// Buffers requested after clamping.
        count: usize,
        /// Why the buffer failed.
        #[source]
        source: BufferError,
    },
}

/// Constructor for the producer/consumer pair.
pub struct BufferRing;

impl BufferRing {
    /// Allocates `count` buffers for `layout` and splits the ring.
    ///
    /// `count` is clamped to `[MIN_BUFFERS, MAX_BUFFERS]`. Any allocation
    /// failure releases the buffers allocated so far and fails the whole
    /// request.
    pub fn allocate(count: usize, layout: &FrameLayout) -> Result<(Producer, Consumer), RingError> {
        let count = count.clamp(MIN_BUFFERS, MAX_BUFFERS);

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            let buffer = FrameBuffer::allocate(layout).map_err(|source| RingError::Allocation {
                index,
                count,
                source,
            })?;
            slots.push(Slot(UnsafeCell::new(Some(buffer))));
        }

        tracing::debug!(
            count,
            image_size = layout.image_size(),
            "Buffer ring allocated"
        );

        let shared = Arc::new(Shared {
            slots: slots.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        });

        Ok((Producer::new(Arc::clone(&shared)), Consumer::new(shared)))
    }
}

struct Slot(UnsafeCell<Option<FrameBuffer>>);

/// State shared by the two ring handles.
pub(crate) struct Shared {
    slots: Box<[Slot]>,
    /// `in`: next slot the producer fills.
    head: AtomicUsize,
    /// `out`: oldest slot the consumer has not released.
    tail: AtomicUsize,
}

// SAFETY: Each slot is accessed by at most one side at a time. The producer
// touches only `slots[head]` and only while `next(head) != tail`, checked on
// every acquire, publish and restore; the consumer touches only
// `slots[tail]` and only while `tail != head`.
// The cursor stores use Release and the opposite side's loads use Acquire,
// so the slot contents are published before the cursor that hands them over.
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.len()
    }

    /// Number of published, unreleased slots.
    fn ready(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.len() - tail) % self.len()
    }

    /// # Safety
    ///
    /// Only the producer may call this, for `index == head`, while
    /// `next(head) != tail`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn producer_slot(&self, index: usize) -> &mut Option<FrameBuffer> {
        // SAFETY: the caller guarantees exclusive access to this slot.
        unsafe { &mut *self.slots[index].0.get() }
    }

    /// # Safety
    ///
    /// Only the consumer may call this, for `index == tail`, while
    /// `tail != head`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn consumer_slot(&self, index: usize) -> &mut Option<FrameBuffer> {
        // SAFETY: the caller guarantees exclusive access to this slot.
        unsafe { &mut *self.slots[index].0.get() }
    }
}
