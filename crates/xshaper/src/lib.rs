//! Userspace traffic shaper on top of an AF_XDP socket.
//!
//! Packets redirected into the socket are held for a fixed delay, every Nth
//! one is dropped, and the rest are sent back out the same queue. The payload
//! never moves: only frame addresses circulate between the four rings, the
//! free pool and the delay queue.

pub mod builder;
pub mod config;
pub mod delay;
pub mod engine;
pub mod error;
pub mod frame;
pub mod policy;
pub mod raw;
pub mod signal;
pub mod simulator;

pub use builder::ShaperBuilder;
pub use config::ShaperConfig;
pub use engine::{Shaper, ShaperStats, StepOutcome};
pub use error::ShaperError;
