use std::io;
use std::mem;
pub use std::os::unix::io::RawFd;
use std::os::unix::io::{FromRawFd, OwnedFd};

use libc::{
    bind, c_void, mmap, poll, pollfd, sendto, setsockopt, sockaddr, socket, socklen_t, AF_XDP,
    MAP_POPULATE, MAP_SHARED, MSG_DONTWAIT, POLLIN, PROT_READ, PROT_WRITE, SOCK_RAW,
};

use crate::sys::if_xdp::*;

pub fn create_xsk_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { socket(AF_XDP, SOCK_RAW | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub fn bind_socket(fd: RawFd, ifindex: u32, queue_id: u32, bind_flags: u16) -> io::Result<()> {
    let mut sa: SockaddrXdp = unsafe { mem::zeroed() };
    sa.sxdp_family = AF_XDP as u16;
    sa.sxdp_ifindex = ifindex;
    sa.sxdp_queue_id = queue_id;
    sa.sxdp_flags = bind_flags;

    let ret = unsafe {
        bind(fd, &sa as *const _ as *const sockaddr, mem::size_of::<SockaddrXdp>() as socklen_t)
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_umem_reg(fd: RawFd, umem_addr: u64, len: u64, chunk_size: u32, headroom: u32) -> io::Result<()> {
    let mr = XdpUmemReg {
        addr: umem_addr,
        len,
        chunk_size,
        headroom,
        flags: 0,
    };
    set_opt(fd, XDP_UMEM_REG, &mr)
}

pub fn set_ring_size(fd: RawFd, ring_type: i32, size: u32) -> io::Result<()> {
    set_opt(fd, ring_type, &size)
}

fn set_opt<T>(fd: RawFd, name: i32, value: &T) -> io::Result<()> {
    let ret = unsafe {
        setsockopt(fd, SOL_XDP, name, value as *const T as *const c_void, mem::size_of::<T>() as socklen_t)
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn get_opt<T: Default>(fd: RawFd, name: i32) -> io::Result<T> {
    let mut value = T::default();
    let mut len = mem::size_of::<T>() as socklen_t;
    let ret = unsafe {
        libc::getsockopt(fd, SOL_XDP, name, &mut value as *mut T as *mut c_void, &mut len)
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

pub fn get_mmap_offsets(fd: RawFd) -> io::Result<XdpMmapOffsets> {
    get_opt(fd, XDP_MMAP_OFFSETS)
}

pub fn get_statistics(fd: RawFd) -> io::Result<XdpStatistics> {
    get_opt(fd, XDP_STATISTICS)
}

/// # Safety
/// The returned mapping must be released with [`munmap`] (or wrapped in an
/// [`MmapArea`](crate::sys::mmap::MmapArea)).
pub unsafe fn mmap_range(fd: RawFd, len: usize, offset: u64) -> io::Result<*mut u8> {
    let ptr = mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_SHARED | MAP_POPULATE,
        fd,
        offset as libc::off_t,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr`/`len` must describe a mapping created by [`mmap_range`].
pub unsafe fn munmap(ptr: *mut u8, len: usize) -> io::Result<()> {
    let ret = libc::munmap(ptr as *mut c_void, len);
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Transmit doorbell: a zero-length non-blocking send.
pub fn kick_tx(fd: RawFd) -> io::Result<()> {
    let ret = unsafe { sendto(fd, std::ptr::null(), 0, MSG_DONTWAIT, std::ptr::null(), 0) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        // The driver is already busy with the ring; the kick is redundant.
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EBUSY) | Some(libc::ENOBUFS) | Some(libc::ENETDOWN) => {}
            _ => return Err(err),
        }
    }
    Ok(())
}

/// Wait up to `timeout_ms` for the socket to become readable.
///
/// A signal interrupting the wait counts as a timeout.
pub fn wait_rx(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = pollfd {
        fd,
        events: POLLIN,
        revents: 0,
    };

    let ret = unsafe { poll(&mut pfd, 1, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(ret > 0)
}
