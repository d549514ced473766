use super::Shared;
use crate::buffer::FrameBuffer;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Callback invoked with the sequence number of each published frame.
///
/// Runs in the producer's context, which is the interrupt path of the
/// capture engine: it must not block.
pub type ReadyHandler = Box<dyn FnMut(u32) + Send>;

/// A free buffer taken from the ring by [`Producer::try_acquire_free`].
///
/// Only this type is accepted back by [`Producer::publish`] and
/// [`Producer::restore`], so nothing but the slot the producer handed out
/// can re-enter the ring. Dropping it instead loses that slot's buffer and
/// leaves the ring one buffer short.
#[must_use = "an acquired buffer must be published or restored"]
pub struct FreeBuffer {
    buffer: FrameBuffer,
    shared: Arc<Shared>,
    index: usize,
}

impl FreeBuffer {
    /// Ring slot the buffer was taken from.
    pub fn slot(&self) -> usize {
        self.index
    }
}

impl Deref for FreeBuffer {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl DerefMut for FreeBuffer {
    fn deref_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }
}

impl std::fmt::Debug for FreeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeBuffer")
            .field("slot", &self.index)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Producer end of the ring, owned by the capture engine.
pub struct Producer {
    shared: Arc<Shared>,
    ready_handler: Option<ReadyHandler>,
}

impl Producer {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            ready_handler: None,
        }
    }

    /// Takes the next free buffer, or `None` if the ring is full or the
    /// free buffer is already out.
    pub fn try_acquire_free(&mut self) -> Option<FreeBuffer> {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        if self.shared.next(head) == tail {
            return None;
        }

        // SAFETY: `head` is ours and the ring is not full.
        let buffer = unsafe { self.shared.producer_slot(head) }.take()?;
        buffer.sync_for_device();
        Some(FreeBuffer {
            buffer,
            shared: Arc::clone(&self.shared),
            index: head,
        })
    }

    /// Hands a filled buffer to the consumer and returns its sequence number.
    ///
    /// Fails, giving the buffer back, if it was not taken from this ring's
    /// current free slot.
    pub fn publish(&mut self, buffer: FreeBuffer) -> Result<u32, FreeBuffer> {
        let Some(head) = self.claim(&buffer) else {
            tracing::warn!(slot = buffer.index, "Rejected publish of a foreign buffer");
            return Err(buffer);
        };
        let sequence = buffer.sequence();

        // SAFETY: `claim` checked that `head` is ours, empty and not full.
        *unsafe { self.shared.producer_slot(head) } = Some(buffer.buffer);
        self.shared
            .head
            .store(self.shared.next(head), Ordering::Release);

        if let Some(handler) = self.ready_handler.as_mut() {
            handler(sequence);
        }

        Ok(sequence)
    }

    /// Returns an acquired buffer to the free pool without publishing it.
    pub fn restore(&mut self, buffer: FreeBuffer) -> Result<(), FreeBuffer> {
        let Some(head) = self.claim(&buffer) else {
            return Err(buffer);
        };
        // SAFETY: `claim` checked that `head` is ours, empty and not full.
        *unsafe { self.shared.producer_slot(head) } = Some(buffer.buffer);
        Ok(())
    }

    /// Checks that `buffer` belongs in slot `head` of this ring.
    fn claim(&mut self, buffer: &FreeBuffer) -> Option<usize> {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        if !Arc::ptr_eq(&buffer.shared, &self.shared)
            || buffer.index != head
            || self.shared.next(head) == tail
        {
            return None;
        }

        // SAFETY: `head` is ours and the ring is not full.
        if unsafe { self.shared.producer_slot(head) }.is_some() {
            return None;
        }
        Some(head)
    }

    /// Registers or clears the ready callback.
    pub fn set_ready_handler(&mut self, handler: Option<ReadyHandler>) {
        self.ready_handler = handler;
    }

    /// Total slots, including the sacrificed one.
    pub fn slots(&self) -> usize {
        self.shared.len()
    }

    /// Published frames the consumer has not released yet.
    pub fn ready_count(&self) -> usize {
        self.shared.ready()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("slots", &self.slots())
            .field("ready", &self.ready_count())
            .field("ready_handler", &self.ready_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::BufferRing;
    use crate::format::{FormatCode, FrameLayout};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn layout() -> FrameLayout {
        FrameLayout::negotiate(16, 16, FormatCode::SRGGB8)
    }

    #[test]
    fn test_ready_handler_receives_sequence() {
        let layout = layout();
        let (mut producer, _consumer) = BufferRing::allocate(3, &layout).unwrap();

        let seen = Arc::new(AtomicU32::new(u32::MAX));
        let sink = Arc::clone(&seen);
        producer.set_ready_handler(Some(Box::new(move |sequence: u32| {
            sink.store(sequence, Ordering::SeqCst);
        })));

        let mut buffer = producer.try_acquire_free().unwrap();
        buffer.stamp(41, &layout);
        assert_eq!(producer.publish(buffer).unwrap(), 41);
        assert_eq!(seen.load(Ordering::SeqCst), 41);

        producer.set_ready_handler(None);
        let mut buffer = producer.try_acquire_free().unwrap();
        buffer.stamp(42, &layout);
        producer.publish(buffer).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 41);
    }

    #[test]
    fn test_restore_keeps_frame_unpublished() {
        let (mut producer, consumer) = BufferRing::allocate(3, &layout()).unwrap();

        let buffer = producer.try_acquire_free().unwrap();
        producer.restore(buffer).unwrap();

        assert_eq!(consumer.ready_count(), 0);
        assert!(producer.try_acquire_free().is_some());
    }

    #[test]
    fn test_one_free_buffer_out_at_a_time() {
        let (mut producer, _consumer) = BufferRing::allocate(4, &layout()).unwrap();

        let buffer = producer.try_acquire_free().unwrap();
        assert_eq!(buffer.slot(), 0);
        assert!(producer.try_acquire_free().is_none());

        producer.publish(buffer).unwrap();
        assert_eq!(producer.try_acquire_free().unwrap().slot(), 1);
    }

    #[test]
    fn test_foreign_buffer_rejected_by_full_ring() {
        let layout = layout();
        let (mut producer, mut consumer) = BufferRing::allocate(3, &layout).unwrap();
        for sequence in 0..2 {
            let mut buffer = producer.try_acquire_free().unwrap();
            buffer.stamp(sequence, &layout);
            producer.publish(buffer).unwrap();
        }
        assert_eq!(consumer.ready_count(), 2);

        let (mut other, _other_consumer) = BufferRing::allocate(3, &layout).unwrap();
        let mut stray = other.try_acquire_free().unwrap();
        stray.stamp(100, &layout);

        let stray = producer.publish(stray).unwrap_err();
        let stray = producer.restore(stray).unwrap_err();
        assert_eq!(consumer.ready_count(), 2);
        assert_eq!(consumer.try_acquire_ready().unwrap().sequence(), 0);

        // Still good for the ring it came from.
        other.restore(stray).unwrap();
    }

    #[test]
    fn test_buffer_from_same_slot_of_other_ring_rejected() {
        let layout = layout();
        let (mut producer, consumer) = BufferRing::allocate(3, &layout).unwrap();
        let (mut other, _other_consumer) = BufferRing::allocate(3, &layout).unwrap();

        let own = producer.try_acquire_free().unwrap();
        let stray = other.try_acquire_free().unwrap();
        assert_eq!(own.slot(), stray.slot());

        assert!(producer.publish(stray).is_err());
        assert_eq!(consumer.ready_count(), 0);
        producer.publish(own).unwrap();
        assert_eq!(consumer.ready_count(), 1);
    }
}
