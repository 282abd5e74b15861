pub mod desc;
pub mod producer;
pub mod consumer;
pub mod heap;

pub use desc::XDPDesc;
pub use producer::ProducerRing;
pub use consumer::ConsumerRing;
pub use heap::HeapRing;

/// Set by the kernel in a ring's flags word when it needs a syscall to notice
/// new entries (requires the `XDP_USE_NEED_WAKEUP` bind flag).
pub const XDP_RING_NEED_WAKEUP: u32 = 1 << 0;
