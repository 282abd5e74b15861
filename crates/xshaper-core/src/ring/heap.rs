use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{ConsumerRing, ProducerRing, XDP_RING_NEED_WAKEUP};

const PRODUCER: usize = 0;
const CONSUMER: usize = 1;
const FLAGS: usize = 2;

/// Ring storage on the process heap, laid out like a kernel-mapped ring
/// (producer word, consumer word, flags word, descriptor array).
///
/// Both ends of the ring can be opened over the same storage, which is how
/// the simulator stands in for the kernel driver.
pub struct HeapRing<T> {
    words: Box<[AtomicU32; 3]>,
    descriptors: NonNull<T>,
    size: u32,
}

unsafe impl<T: Send> Send for HeapRing<T> {}
unsafe impl<T: Send> Sync for HeapRing<T> {}

impl<T: Copy + Default> HeapRing<T> {
    pub fn new(size: u32) -> Self {
        assert!(size.is_power_of_two(), "ring size must be a power of two");
        let slots = vec![T::default(); size as usize].into_boxed_slice();
        let descriptors = NonNull::new(Box::into_raw(slots) as *mut T)
            .unwrap_or_else(NonNull::dangling);
        Self {
            words: Box::new([AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]),
            descriptors,
            size,
        }
    }

    /// # Safety
    /// The returned ring must not outlive `self`, and at most one producer
    /// view may be live at a time.
    pub unsafe fn producer(&self) -> ProducerRing<T> {
        ProducerRing::new(
            self.words[PRODUCER].as_ptr(),
            self.words[CONSUMER].as_ptr(),
            self.words[FLAGS].as_ptr(),
            self.descriptors.as_ptr(),
            self.size,
        )
    }

    /// # Safety
    /// The returned ring must not outlive `self`, and at most one consumer
    /// view may be live at a time.
    pub unsafe fn consumer(&self) -> ConsumerRing<T> {
        ConsumerRing::new(
            self.words[PRODUCER].as_ptr(),
            self.words[CONSUMER].as_ptr(),
            self.descriptors.as_ptr(),
            self.size,
        )
    }

    pub fn set_need_wakeup(&self, on: bool) {
        if on {
            self.words[FLAGS].fetch_or(XDP_RING_NEED_WAKEUP, Ordering::Release);
        } else {
            self.words[FLAGS].fetch_and(!XDP_RING_NEED_WAKEUP, Ordering::Release);
        }
    }

    pub fn producer_idx(&self) -> u32 {
        self.words[PRODUCER].load(Ordering::Acquire)
    }

    pub fn consumer_idx(&self) -> u32 {
        self.words[CONSUMER].load(Ordering::Acquire)
    }

    /// Positions both indices at `idx`, leaving the ring empty.
    pub fn reset_to(&self, idx: u32) {
        self.words[PRODUCER].store(idx, Ordering::Release);
        self.words[CONSUMER].store(idx, Ordering::Release);
    }

    pub fn len(&self) -> u32 {
        self.size
    }
}

impl<T> Drop for HeapRing<T> {
    fn drop(&mut self) {
        let slots = std::ptr::slice_from_raw_parts_mut(self.descriptors.as_ptr(), self.size as usize);
        unsafe { drop(Box::from_raw(slots)) };
    }
}
