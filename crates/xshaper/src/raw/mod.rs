use std::io;
use std::time::Duration;

use xshaper_core::ring::{ConsumerRing, ProducerRing, XDPDesc};

pub mod socket;

pub use socket::{XskLink, XskSocket};

/// The four shared rings, seen from the process side.
pub struct Rings {
    pub fill: ProducerRing<u64>,
    pub comp: ConsumerRing<u64>,
    pub rx: ConsumerRing<XDPDesc>,
    pub tx: ProducerRing<XDPDesc>,
}

/// Syscall side of the socket: telling the driver to look at its rings, and
/// blocking while there is nothing to do.
pub trait Doorbell {
    /// Tell the driver there are new Transmit entries.
    fn kick_tx(&mut self) -> io::Result<()>;

    /// Tell the driver there are new Fill entries.
    fn wake_fill(&mut self) -> io::Result<()>;

    /// Block up to `timeout` for received packets. `Ok(true)` when the socket
    /// became readable.
    fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}
