use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmemLayout {
    pub frame_size: u32,
    pub frame_count: u32,
}

impl UmemLayout {
    pub const MIN_FRAME_SIZE: u32 = 2048;

    pub fn new(frame_size: u32, frame_count: u32) -> io::Result<Self> {
        if !frame_size.is_power_of_two() || frame_size < Self::MIN_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame size {frame_size} must be a power of two >= {}", Self::MIN_FRAME_SIZE),
            ));
        }
        if frame_count == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame count must be non-zero"));
        }

        Ok(Self {
            frame_size,
            frame_count,
        })
    }

    pub fn size(&self) -> usize {
        (self.frame_size as usize) * (self.frame_count as usize)
    }

    /// Frame index holding `addr`. Addresses inside a frame map to that frame.
    #[inline]
    pub fn addr_to_idx(&self, addr: u64) -> Option<u32> {
        if addr >= (self.size() as u64) {
            return None;
        }
        Some((addr / self.frame_size as u64) as u32)
    }

    #[inline]
    pub fn idx_to_addr(&self, idx: u32) -> Option<u64> {
        if idx >= self.frame_count {
            return None;
        }
        Some((idx as u64) * (self.frame_size as u64))
    }

    /// Start address of every frame, in index order.
    pub fn addresses(&self) -> impl Iterator<Item = u64> {
        let frame_size = self.frame_size as u64;
        (0..self.frame_count as u64).map(move |i| i * frame_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_rejects_bad_geometry() {
        assert!(UmemLayout::new(1000, 16).is_err());
        assert!(UmemLayout::new(1024, 16).is_err());
        assert!(UmemLayout::new(2048, 0).is_err());
        assert!(UmemLayout::new(4096, 16).is_ok());
    }

    #[test]
    fn test_addr_idx_mapping() {
        let layout = UmemLayout::new(2048, 4).unwrap();
        assert_eq!(layout.size(), 8192);
        assert_eq!(layout.idx_to_addr(3), Some(6144));
        assert_eq!(layout.idx_to_addr(4), None);
        assert_eq!(layout.addr_to_idx(6144 + 100), Some(3));
        assert_eq!(layout.addr_to_idx(8192), None);
        assert_eq!(layout.addresses().collect::<Vec<_>>(), vec![0, 2048, 4096, 6144]);
    }
}
