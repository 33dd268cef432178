//! Single-producer single-consumer handoff queue
//!
//! Fixed-capacity lock-free ring decoupling the network thread from disk
//! I/O. The tail index is written only by the producer, the head only by
//! the consumer; publication uses release/acquire pairs so every field of
//! a dequeued value is visible to the consumer. Zero allocation after
//! construction.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic index on its own cache line to prevent false sharing
#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

/// Lock-free SPSC ring buffer
///
/// Exactly one thread may call `enqueue` and exactly one thread may call
/// `dequeue`. Capacity must be a power of two.
pub struct SpscQueue<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot to write; owned by the producer
    tail: PaddedIndex,
    /// Next slot to read; owned by the consumer
    head: PaddedIndex,
}

// SAFETY: slots are handed off with release/acquire ordering and each slot
// is accessed by at most one thread at a time under the SPSC contract.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T: Copy> SpscQueue<T> {
    /// Create a queue with the given capacity (must be a power of two)
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "queue capacity must be a power of two"
        );
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            buffer,
            mask: capacity - 1,
            tail: PaddedIndex(AtomicUsize::new(0)),
            head: PaddedIndex(AtomicUsize::new(0)),
        }
    }

    /// Enqueue a value. Returns false when full; the caller's policy is to
    /// drop, never to block or retry.
    #[inline]
    pub fn enqueue(&self, value: T) -> bool {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == self.buffer.len() {
            return false;
        }
        // SAFETY: the slot at `tail` is unoccupied (checked above) and only
        // the producer writes slots.
        unsafe {
            (*self.buffer[tail & self.mask].get()).write(value);
        }
        self.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Dequeue the oldest value, or None when empty
    #[inline]
    pub fn dequeue(&self) -> Option<T> {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: the producer published this slot with release ordering,
        // so its contents are fully initialized and visible.
        let value = unsafe { (*self.buffer[head & self.mask].get()).assume_init_read() };
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Approximate number of queued values
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// Returns true when no values are queued
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
