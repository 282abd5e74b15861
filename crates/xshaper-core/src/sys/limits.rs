use std::io;

/// Attaching XDP programs and registering UMEM both need root.
pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Lift RLIMIT_MEMLOCK so the UMEM and ring mappings can be pinned.
pub fn raise_memlock_limit() -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
