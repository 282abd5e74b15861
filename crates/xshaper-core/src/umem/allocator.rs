use std::collections::VecDeque;

use crate::umem::layout::UmemLayout;

/// Free list of frame addresses, populated once with every frame.
pub struct UmemAllocator {
    free_frames: VecDeque<u64>,
    layout: UmemLayout,
}

impl UmemAllocator {
    pub fn new(layout: UmemLayout) -> Self {
        let mut free_frames = VecDeque::with_capacity(layout.frame_count as usize);
        free_frames.extend(layout.addresses());

        Self {
            free_frames,
            layout,
        }
    }

    pub fn allocate(&mut self) -> Option<u64> {
        self.free_frames.pop_front()
    }

    pub fn release(&mut self, addr: u64) {
        debug_assert!(self.layout.addr_to_idx(addr).is_some(), "address {addr:#x} outside UMEM");
        debug_assert!(
            self.free_frames.len() < self.layout.frame_count as usize,
            "free list overflow: address {addr:#x} released twice"
        );
        self.free_frames.push_back(addr);
    }

    pub fn available(&self) -> usize {
        self.free_frames.len()
    }

    pub fn layout(&self) -> UmemLayout {
        self.layout
    }
}
