use super::Shared;
use crate::buffer::FrameBuffer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Consumer end of the ring, owned by the application.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Oldest ready frame, without removing it from the ring.
    ///
    /// Returns `None` when nothing is ready. Call [`release`](Self::release)
    /// once done with the frame.
    pub fn try_acquire_ready(&mut self) -> Option<&mut FrameBuffer> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        // SAFETY: `tail` is ours and lies in `[tail, head)`.
        let buffer = unsafe { self.shared.consumer_slot(tail) }.as_mut()?;
        buffer.sync_for_cpu();
        Some(buffer)
    }

    /// Returns the oldest ready frame to the free pool.
    ///
    /// Returns `false` if nothing was ready.
    pub fn release(&mut self) -> bool {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        if head == tail {
            return false;
        }

        self.shared
            .tail
            .store(self.shared.next(tail), Ordering::Release);
        true
    }

    /// Releases every ready frame; returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut released = 0;
        while self.release() {
            released += 1;
        }
        released
    }

    /// Frames that can be ready or in flight at once.
    pub fn capacity(&self) -> usize {
        self.shared.len() - 1
    }

    /// Published frames not yet released.
    pub fn ready_count(&self) -> usize {
        self.shared.ready()
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("ready", &self.ready_count())
            .finish()
    }
}
