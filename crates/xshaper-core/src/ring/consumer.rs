use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-side consumer of a shared ring (Receive and Completion).
pub struct ConsumerRing<T> {
    producer: *const AtomicU32,
    consumer: *mut AtomicU32,
    descriptors: *const T,
    mask: u32,
    size: u32,
    cached_prod: u32,
    cached_cons: u32,
}

unsafe impl<T> Send for ConsumerRing<T> {}

impl<T: Copy> ConsumerRing<T> {
    /// # Safety
    /// Pointers must be valid for the lifetime of the ring, `descriptors` must
    /// hold `size` entries and `size` must be a power of two.
    pub unsafe fn new(
        producer: *mut u32,
        consumer: *mut u32,
        descriptors: *mut T,
        size: u32,
    ) -> Self {
        debug_assert!(size.is_power_of_two());
        let producer = producer as *const AtomicU32;
        let consumer = consumer as *mut AtomicU32;
        let cached_prod = (*producer).load(Ordering::Acquire);
        let cached_cons = (*consumer).load(Ordering::Relaxed);
        Self {
            producer,
            consumer,
            descriptors,
            mask: size - 1,
            size,
            cached_prod,
            cached_cons,
        }
    }

    /// Look at up to `max` available entries.
    ///
    /// Returns `(count, start_idx)`; `count` may be zero. Nothing is handed
    /// back to the producer until [`release`](Self::release).
    #[inline]
    pub fn peek(&mut self, max: u32) -> (u32, u32) {
        let mut entries = self.cached_prod.wrapping_sub(self.cached_cons);
        if entries == 0 {
            self.cached_prod = unsafe { (*self.producer).load(Ordering::Acquire) };
            entries = self.cached_prod.wrapping_sub(self.cached_cons);
        }
        let count = entries.min(max);
        (count, self.cached_cons)
    }

    /// Hand `count` entries, starting at the oldest unreleased one, back to
    /// the producer. Peeked entries past `count` are seen again by the next
    /// `peek`.
    #[inline]
    pub fn release(&mut self, count: u32) {
        let released = unsafe { (*self.consumer).load(Ordering::Relaxed) }.wrapping_add(count);
        self.cached_cons = released;
        unsafe { (*self.consumer).store(released, Ordering::Release) };
    }

    /// # Safety
    /// `idx` must lie within the range returned by the last `peek`.
    #[inline]
    pub unsafe fn read_at(&self, idx: u32) -> T {
        let offset = (idx & self.mask) as usize;
        ptr::read(self.descriptors.add(offset))
    }

    #[inline]
    pub fn consumer_idx(&self) -> u32 {
        unsafe { (*self.consumer).load(Ordering::Relaxed) }
    }

    /// Entries produced but not yet released.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        let producer_idx = unsafe { (*self.producer).load(Ordering::Acquire) };
        producer_idx.wrapping_sub(self.consumer_idx())
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.size
    }
}
