use std::io;
use std::ptr::NonNull;

use crate::sys::socket::munmap;

/// Owns one ring mapping; unmapped on drop.
pub struct MmapArea {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for MmapArea {}
unsafe impl Sync for MmapArea {}

impl MmapArea {
    /// # Safety
    /// `ptr` must be a live mapping of `len` bytes whose ownership moves to
    /// the returned value.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> io::Result<Self> {
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(Self { ptr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Pointer `offset` bytes into the mapping, typed as `T`.
    ///
    /// # Safety
    /// `offset` must be an offset reported by the kernel for this mapping.
    pub unsafe fn at<T>(&self, offset: u64) -> *mut T {
        self.ptr.as_ptr().add(offset as usize) as *mut T
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MmapArea {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.as_ptr(), self.len);
        }
    }
}
