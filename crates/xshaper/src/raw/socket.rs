use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use xshaper_core::sys::if_xdp::XdpStatistics;
use xshaper_core::sys::mmap::MmapArea;
use xshaper_core::sys::socket::{get_statistics, kick_tx, wait_rx};
use xshaper_core::umem::mmap::UmemRegion;

use super::{Doorbell, Rings};

/// A bound AF_XDP socket with its UMEM, ring mappings and redirect program.
///
/// The rings point into mappings owned by the link, so they only leave this
/// type together with it, inside a shaper:
///
/// ```compile_fail
/// fn split(socket: xshaper::raw::XskSocket) {
///     let (_rings, _link) = socket.into_parts();
/// }
/// ```
pub struct XskSocket {
    rings: Rings,
    link: XskLink,
}

impl XskSocket {
    pub(crate) fn new(rings: Rings, link: XskLink) -> Self {
        Self { rings, link }
    }

    pub fn fd(&self) -> RawFd {
        self.link.fd()
    }

    pub fn statistics(&self) -> io::Result<XdpStatistics> {
        self.link.statistics()
    }

    pub(crate) fn into_parts(self) -> (Rings, XskLink) {
        (self.rings, self.link)
    }
}

/// Owns every kernel resource the rings point into.
///
/// Fields drop in declaration order: the program is detached first, then the
/// ring mappings go, then the socket closes and the UMEM is unmapped last.
pub struct XskLink {
    ebpf: Option<aya::Ebpf>,
    maps: Vec<MmapArea>,
    fd: OwnedFd,
    umem: UmemRegion,
    ifindex: u32,
    queue_id: u32,
}

// Ring mappings and the UMEM are only touched by the thread driving the shaper.
unsafe impl Send for XskLink {}

impl XskLink {
    pub(crate) fn new(fd: OwnedFd, umem: UmemRegion, maps: Vec<MmapArea>, ifindex: u32, queue_id: u32) -> Self {
        Self {
            ebpf: None,
            maps,
            fd,
            umem,
            ifindex,
            queue_id,
        }
    }

    pub(crate) fn set_program(&mut self, ebpf: aya::Ebpf) {
        self.ebpf = Some(ebpf);
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn queue_id(&self) -> u32 {
        self.queue_id
    }

    pub fn has_program(&self) -> bool {
        self.ebpf.is_some()
    }

    pub fn mapped_bytes(&self) -> usize {
        self.maps.iter().map(MmapArea::len).sum::<usize>() + self.umem.len()
    }

    /// Kernel-side drop and error counters.
    pub fn statistics(&self) -> io::Result<XdpStatistics> {
        get_statistics(self.fd())
    }
}

impl Doorbell for XskLink {
    fn kick_tx(&mut self) -> io::Result<()> {
        kick_tx(self.fd())
    }

    fn wake_fill(&mut self) -> io::Result<()> {
        // A zero-timeout poll is enough for the driver to pick up Fill entries.
        wait_rx(self.fd(), 0).map(|_| ())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        wait_rx(self.fd(), ms)
    }
}
