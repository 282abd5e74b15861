use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use super::XDP_RING_NEED_WAKEUP;

/// Process-side producer of a shared ring (Fill and Transmit).
///
/// Entries are written between `reserve` and `submit`; only `submit` makes
/// them visible to the consumer.
pub struct ProducerRing<T> {
    producer: *mut AtomicU32,
    consumer: *const AtomicU32,
    flags: *const AtomicU32,
    descriptors: *mut T,
    mask: u32,
    size: u32,
    cached_prod: u32,
    cached_cons: u32,
}

unsafe impl<T> Send for ProducerRing<T> {}

impl<T: Copy> ProducerRing<T> {
    /// # Safety
    /// Pointers must be valid for the lifetime of the ring (mapped from the
    /// kernel or owned by a [`HeapRing`](super::HeapRing)), `descriptors` must
    /// hold `size` entries and `size` must be a power of two.
    pub unsafe fn new(
        producer: *mut u32,
        consumer: *mut u32,
        flags: *mut u32,
        descriptors: *mut T,
        size: u32,
    ) -> Self {
        debug_assert!(size.is_power_of_two());
        let producer = producer as *mut AtomicU32;
        let consumer = consumer as *const AtomicU32;
        let cached_prod = (*producer).load(Ordering::Relaxed);
        let cached_cons = (*consumer).load(Ordering::Acquire);
        Self {
            producer,
            consumer,
            flags: flags as *const AtomicU32,
            descriptors,
            mask: size - 1,
            size,
            cached_prod,
            cached_cons,
        }
    }

    /// Free entries, refreshing the consumer index only when the cached view
    /// cannot satisfy `wanted`.
    #[inline]
    pub fn free_entries(&mut self, wanted: u32) -> u32 {
        let free = self.size - self.cached_prod.wrapping_sub(self.cached_cons);
        if free >= wanted {
            return free;
        }
        self.cached_cons = unsafe { (*self.consumer).load(Ordering::Acquire) };
        self.size - self.cached_prod.wrapping_sub(self.cached_cons)
    }

    /// Reserve up to `count` contiguous entries.
    ///
    /// Returns `(granted, start_idx)`. `granted` may be anything from zero to
    /// `count`; a zero grant means the ring is full, not that anything failed.
    #[inline]
    pub fn reserve(&mut self, count: u32) -> (u32, u32) {
        let granted = self.free_entries(count).min(count);
        let start = self.cached_prod;
        self.cached_prod = self.cached_prod.wrapping_add(granted);
        (granted, start)
    }

    /// Publish `count` entries written since the last submit.
    ///
    /// Any reserved entries beyond `count` are handed back and will be granted
    /// again by the next `reserve`.
    #[inline]
    pub fn submit(&mut self, count: u32) {
        let published = unsafe { (*self.producer).load(Ordering::Relaxed) }.wrapping_add(count);
        self.cached_prod = published;
        unsafe { (*self.producer).store(published, Ordering::Release) };
    }

    /// # Safety
    /// `idx` must come from a grant of the current reservation.
    #[inline]
    pub unsafe fn write_at(&mut self, idx: u32, item: T) {
        let offset = (idx & self.mask) as usize;
        ptr::write(self.descriptors.add(offset), item);
    }

    /// Whether the consumer asked for an explicit wakeup before it looks at
    /// newly submitted entries.
    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        if self.flags.is_null() {
            return false;
        }
        unsafe { (*self.flags).load(Ordering::Relaxed) & XDP_RING_NEED_WAKEUP != 0 }
    }

    /// Entries submitted but not yet consumed.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        let producer_idx = unsafe { (*self.producer).load(Ordering::Relaxed) };
        let consumer_idx = unsafe { (*self.consumer).load(Ordering::Acquire) };
        producer_idx.wrapping_sub(consumer_idx)
    }

    #[inline]
    pub fn available(&self) -> u32 {
        self.size - self.outstanding()
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.size
    }
}
