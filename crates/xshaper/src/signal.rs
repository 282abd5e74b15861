use std::sync::atomic::{AtomicBool, Ordering};

// Signal handlers can only reach statics. Once set, never cleared.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Route SIGINT and SIGTERM to a stop flag for [`Shaper::run`](crate::Shaper::run).
pub fn install_stop_handlers() -> &'static AtomicBool {
    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }
    &STOP
}
