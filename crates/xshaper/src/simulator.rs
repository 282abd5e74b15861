//! In-process stand-in for the driver side of the four rings.
//!
//! The rings live on the heap instead of in a kernel mapping. [`SimDriver`]
//! plays the NIC: it takes frames off Fill, delivers packets into Receive,
//! and moves transmitted descriptors from Transmit to Completion.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use xshaper_core::ring::{ConsumerRing, HeapRing, ProducerRing, XDPDesc};
use xshaper_core::umem::mmap::UmemRegion;

use crate::config::ShaperConfig;
use crate::engine::Shaper;
use crate::error::ShaperError;
use crate::raw::{Doorbell, Rings};

struct SimShared {
    fill: HeapRing<u64>,
    comp: HeapRing<u64>,
    rx: HeapRing<XDPDesc>,
    tx: HeapRing<XDPDesc>,
    tx_kicks: AtomicU64,
    fill_wakeups: AtomicU64,
    waits: AtomicU64,
}

impl SimShared {
    fn rx_ready(&self) -> bool {
        self.rx.producer_idx() != self.rx.consumer_idx()
    }
}

/// Doorbell that only counts. Keeps the shared rings alive for the shaper.
pub struct SimLink {
    shared: Arc<SimShared>,
}

impl Doorbell for SimLink {
    fn kick_tx(&mut self) -> io::Result<()> {
        self.shared.tx_kicks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wake_fill(&mut self) -> io::Result<()> {
        self.shared.fill_wakeups.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        self.shared.waits.fetch_add(1, Ordering::Relaxed);
        if self.shared.rx_ready() {
            return Ok(true);
        }
        thread::sleep(timeout);
        Ok(self.shared.rx_ready())
    }
}

/// The driver end of every ring, plus the frame memory it writes into.
pub struct SimDriver {
    shared: Arc<SimShared>,
    fill: ConsumerRing<u64>,
    comp: ProducerRing<u64>,
    rx: ProducerRing<XDPDesc>,
    tx: ConsumerRing<XDPDesc>,
    umem: UmemRegion,
    /// Frames taken off Fill and not yet delivered.
    posted: VecDeque<u64>,
}

// Ring views point into `shared`, which the driver keeps alive.
unsafe impl Send for SimDriver {}

/// Build a shaper wired to a simulated driver.
pub fn simulate(config: &ShaperConfig) -> Result<(Shaper<SimLink>, SimDriver), ShaperError> {
    config.validate()?;
    let layout = config.layout()?;

    let shared = Arc::new(SimShared {
        fill: HeapRing::new(config.rings.fill),
        comp: HeapRing::new(config.rings.completion),
        rx: HeapRing::new(config.rings.rx),
        tx: HeapRing::new(config.rings.tx),
        tx_kicks: AtomicU64::new(0),
        fill_wakeups: AtomicU64::new(0),
        waits: AtomicU64::new(0),
    });

    // Each ring gets exactly one producer view and one consumer view. The
    // storage lives in `shared`, held by both the link and the driver.
    let rings = unsafe {
        Rings {
            fill: shared.fill.producer(),
            comp: shared.comp.consumer(),
            rx: shared.rx.consumer(),
            tx: shared.tx.producer(),
        }
    };
    let driver = unsafe {
        SimDriver {
            fill: shared.fill.consumer(),
            comp: shared.comp.producer(),
            rx: shared.rx.producer(),
            tx: shared.tx.consumer(),
            umem: UmemRegion::new(layout)?,
            posted: VecDeque::with_capacity(layout.frame_count as usize),
            shared: Arc::clone(&shared),
        }
    };

    let shaper = Shaper::new(rings, SimLink { shared }, config)?;
    Ok((shaper, driver))
}

impl SimDriver {
    /// Move up to `max` frames from Fill into the driver's hands.
    pub fn absorb_fill(&mut self, max: u32) -> u32 {
        let (count, start) = self.fill.peek(max);
        for i in 0..count {
            self.posted.push_back(unsafe { self.fill.read_at(start.wrapping_add(i)) });
        }
        self.fill.release(count);
        count
    }

    /// Receive one packet into a posted frame.
    ///
    /// Returns the frame address used, or `None` when no frame is posted or
    /// the Receive ring is full (the packet is lost, as on a real NIC).
    pub fn deliver(&mut self, packet: &[u8]) -> Option<u64> {
        if self.posted.is_empty() {
            self.absorb_fill(u32::MAX);
        }
        let addr = self.posted.front().copied()?;

        let (granted, idx) = self.rx.reserve(1);
        if granted == 0 {
            return None;
        }
        self.posted.pop_front();

        let len = packet.len().min(self.umem.layout().frame_size as usize);
        if let Some(buf) = self.umem.frame_mut(addr, len) {
            buf.copy_from_slice(&packet[..len]);
        }
        unsafe {
            self.rx.write_at(
                idx,
                XDPDesc {
                    addr,
                    len: len as u32,
                    options: 0,
                },
            )
        };
        self.rx.submit(1);
        Some(addr)
    }

    /// Send up to `max` descriptors off the Transmit ring and post their
    /// frames to Completion. Stops early when Completion is full.
    pub fn transmit(&mut self, max: u32) -> Vec<XDPDesc> {
        let (available, start) = self.tx.peek(max);
        let (granted, comp_idx) = self.comp.reserve(available);

        let mut sent = Vec::with_capacity(granted as usize);
        for i in 0..granted {
            let desc = unsafe { self.tx.read_at(start.wrapping_add(i)) };
            unsafe { self.comp.write_at(comp_idx.wrapping_add(i), desc.addr) };
            sent.push(desc);
        }
        self.comp.submit(granted);
        self.tx.release(granted);
        sent
    }

    /// Bytes a descriptor points at.
    pub fn payload(&self, desc: &XDPDesc) -> Option<&[u8]> {
        self.umem.frame(desc.addr, desc.len as usize)
    }

    pub fn set_tx_need_wakeup(&self, on: bool) {
        self.shared.tx.set_need_wakeup(on);
    }

    pub fn set_fill_need_wakeup(&self, on: bool) {
        self.shared.fill.set_need_wakeup(on);
    }

    /// Frames the driver holds, taken from Fill but not yet delivered.
    pub fn held(&self) -> usize {
        self.posted.len()
    }

    pub fn posted_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.posted.iter().copied()
    }

    pub fn fill_outstanding(&self) -> u32 {
        self.shared.fill.producer_idx().wrapping_sub(self.shared.fill.consumer_idx())
    }

    pub fn completion_outstanding(&self) -> u32 {
        self.shared.comp.producer_idx().wrapping_sub(self.shared.comp.consumer_idx())
    }

    pub fn rx_outstanding(&self) -> u32 {
        self.shared.rx.producer_idx().wrapping_sub(self.shared.rx.consumer_idx())
    }

    pub fn tx_outstanding(&self) -> u32 {
        self.shared.tx.producer_idx().wrapping_sub(self.shared.tx.consumer_idx())
    }

    pub fn tx_kicks(&self) -> u64 {
        self.shared.tx_kicks.load(Ordering::Relaxed)
    }

    pub fn fill_wakeups(&self) -> u64 {
        self.shared.fill_wakeups.load(Ordering::Relaxed)
    }

    pub fn waits(&self) -> u64 {
        self.shared.waits.load(Ordering::Relaxed)
    }
}
