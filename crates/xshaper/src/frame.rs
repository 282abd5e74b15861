use xshaper_core::umem::allocator::UmemAllocator;
use xshaper_core::umem::layout::UmemLayout;

/// Exclusive ownership of one UMEM frame slot.
///
/// Only the pool and the ring hand-off code create or consume these, so a
/// slot is held by exactly one place at a time: the free pool, a ring, or
/// the delay queue. Not `Clone`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Frame loses its UMEM slot"]
pub struct Frame {
    addr: u64,
}

impl Frame {
    /// Take ownership of an address just read off a ring.
    pub(crate) fn claim(addr: u64) -> Self {
        Self { addr }
    }

    /// Give up ownership so the address can be written into a ring.
    pub(crate) fn into_addr(self) -> u64 {
        self.addr
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }
}

/// Frames not currently referenced by any ring or by the delay queue.
pub struct FramePool {
    free: UmemAllocator,
}

impl FramePool {
    /// Every frame of `layout` starts out free.
    pub fn new(layout: UmemLayout) -> Self {
        Self {
            free: UmemAllocator::new(layout),
        }
    }

    pub fn acquire(&mut self) -> Option<Frame> {
        self.free.allocate().map(Frame::claim)
    }

    /// Addresses coming back from the driver may point inside the frame;
    /// the pool stores the frame start.
    pub fn release(&mut self, frame: Frame) {
        let layout = self.free.layout();
        let base = layout
            .addr_to_idx(frame.addr)
            .and_then(|idx| layout.idx_to_addr(idx))
            .unwrap_or(frame.addr);
        self.free.release(base);
    }

    pub fn available(&self) -> usize {
        self.free.available()
    }

    pub fn is_empty(&self) -> bool {
        self.free.available() == 0
    }

    pub fn total(&self) -> usize {
        self.free.layout().frame_count as usize
    }
}
