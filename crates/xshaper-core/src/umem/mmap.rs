use std::io;

use memmap2::{MmapMut, MmapOptions};

use crate::umem::layout::UmemLayout;

/// Anonymous, pre-faulted memory backing every frame slot.
pub struct UmemRegion {
    mmap: MmapMut,
    layout: UmemLayout,
}

impl UmemRegion {
    pub fn new(layout: UmemLayout) -> io::Result<Self> {
        let mmap = MmapOptions::new().len(layout.size()).populate().map_anon()?;
        Ok(Self { mmap, layout })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn layout(&self) -> UmemLayout {
        self.layout
    }

    /// Bytes of the frame at `addr`, clipped to `len`.
    pub fn frame(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let end = (addr as usize).checked_add(len)?;
        self.layout.addr_to_idx(addr)?;
        self.mmap.get(addr as usize..end)
    }

    pub fn frame_mut(&mut self, addr: u64, len: usize) -> Option<&mut [u8]> {
        let end = (addr as usize).checked_add(len)?;
        self.layout.addr_to_idx(addr)?;
        self.mmap.get_mut(addr as usize..end)
    }
}
