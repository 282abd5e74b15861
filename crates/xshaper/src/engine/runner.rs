use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use tracing::{debug, info, trace};
use xshaper_core::ring::XDPDesc;

use crate::config::{Batches, ShaperConfig};
use crate::delay::{DelayQueue, PendingPacket};
use crate::engine::stats::ShaperStats;
use crate::error::ShaperError;
use crate::frame::{Frame, FramePool};
use crate::policy::{ShapingPolicy, Verdict};
use crate::raw::{Doorbell, Rings};

/// What one pass of the drive loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub reclaimed: u32,
    pub refilled: u32,
    pub received: u32,
    pub dropped: u32,
    pub delayed: u32,
    pub transmitted: u32,
    /// Nothing was received and nothing is pending; the loop may block.
    pub idle: bool,
}

/// Entries currently sitting in each ring, as seen from the process side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingOccupancy {
    pub fill: u32,
    pub completion: u32,
    pub rx: u32,
    pub tx: u32,
}

/// The drive loop and every piece of state it touches.
///
/// Generic over the doorbell so the same loop runs against a bound socket or
/// against the in-process simulator.
pub struct Shaper<L: Doorbell> {
    rings: Rings,
    link: L,
    pool: FramePool,
    policy: ShapingPolicy,
    queue: DelayQueue,
    batches: Batches,
    idle_timeout: Duration,
    drops: Vec<Frame>,
    ready: Vec<PendingPacket>,
    stats: ShaperStats,
}

impl<L: Doorbell> Shaper<L> {
    /// Takes ownership of the rings and posts the initial Fill batch.
    ///
    /// Every UMEM frame starts in the free pool; whatever does not fit into
    /// the Fill ring stays there and is offered on later iterations.
    pub fn new(rings: Rings, link: L, config: &ShaperConfig) -> Result<Self, ShaperError> {
        let layout = config.layout()?;
        let batch = config.batches.rx.max(config.batches.tx) as usize;
        let mut shaper = Self {
            rings,
            link,
            pool: FramePool::new(layout),
            policy: ShapingPolicy::new(config.delay, config.drop_nth),
            queue: DelayQueue::new(),
            batches: config.batches,
            idle_timeout: config.idle_timeout,
            drops: Vec::with_capacity(batch),
            ready: Vec::with_capacity(batch),
            stats: ShaperStats::default(),
        };

        let posted = shaper.refill()?;
        debug!(
            posted,
            free = shaper.pool.available(),
            total = shaper.pool.total(),
            "initial fill"
        );
        Ok(shaper)
    }

    /// Drive until `stop` is set. The flag is checked between iterations.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), ShaperError> {
        info!(
            delay_ms = self.policy.delay().as_millis() as u64,
            drop_nth = self.policy.drop_nth(),
            "shaper running"
        );
        while !stop.load(Ordering::Relaxed) {
            let outcome = self.step()?;
            if outcome.idle {
                self.stats.idle_waits += 1;
                self.link.wait(self.idle_timeout)?;
            }
        }
        info!(pending = self.queue.len(), "stop requested, leaving drive loop");
        Ok(())
    }

    /// One iteration against the wall clock. Never blocks.
    pub fn step(&mut self) -> io::Result<StepOutcome> {
        self.step_with(Instant::now)
    }

    /// One iteration with a frozen clock.
    pub fn step_at(&mut self, now: Instant) -> io::Result<StepOutcome> {
        self.step_with(|| now)
    }

    /// One iteration; `now` is sampled as each packet is queued and once more
    /// for the transmit phase.
    pub fn step_with(&mut self, now: impl Fn() -> Instant) -> io::Result<StepOutcome> {
        let mut outcome = StepOutcome {
            reclaimed: self.reclaim_completions()?,
            refilled: self.refill()?,
            ..StepOutcome::default()
        };

        let (received, dropped) = self.receive(&now)?;
        outcome.received = received;
        outcome.dropped = dropped;
        outcome.delayed = received - dropped;

        outcome.transmitted = self.transmit_ready(now())?;
        outcome.idle = received == 0 && self.queue.is_empty();

        if !outcome.idle {
            trace!(?outcome, pending = self.queue.len(), "step");
        }
        Ok(outcome)
    }

    /// Phase 1: hand transmitted frames back to the driver for reception.
    ///
    /// Completion entries are released only once their address is on the
    /// Fill ring. When Fill stays full past the backoff, the rest are left in
    /// Completion for the next iteration.
    pub fn reclaim_completions(&mut self) -> io::Result<u32> {
        let (available, start) = self.rings.comp.peek(self.batches.completion);
        if available == 0 {
            return Ok(0);
        }

        let backoff = Backoff::new();
        let mut returned = 0;
        while returned < available {
            let (granted, fill_idx) = self.rings.fill.reserve(available - returned);
            if granted == 0 {
                self.stats.fill_backpressure += 1;
                self.kick_tx_if_needed()?;
                self.wake_fill_if_needed()?;
                if backoff.is_completed() {
                    trace!(
                        returned,
                        remaining = available - returned,
                        "fill ring full, deferring completions"
                    );
                    break;
                }
                backoff.snooze();
                continue;
            }

            for i in 0..granted {
                let addr = unsafe { self.rings.comp.read_at(start.wrapping_add(returned + i)) };
                let frame = Frame::claim(addr);
                unsafe { self.rings.fill.write_at(fill_idx.wrapping_add(i), frame.into_addr()) };
            }
            self.rings.fill.submit(granted);
            returned += granted;
        }

        if returned > 0 {
            self.rings.comp.release(returned);
            self.stats.reclaimed += returned as u64;
            self.wake_fill_if_needed()?;
        }
        Ok(returned)
    }

    /// Offer free-pool frames to the Fill ring, as many as it takes.
    pub fn refill(&mut self) -> io::Result<u32> {
        if self.pool.is_empty() {
            return Ok(0);
        }

        let wanted = self.pool.available().min(u32::MAX as usize) as u32;
        let (granted, idx) = self.rings.fill.reserve(wanted);
        if granted == 0 {
            return Ok(0);
        }

        let mut posted = 0;
        while posted < granted {
            let Some(frame) = self.pool.acquire() else {
                break;
            };
            unsafe { self.rings.fill.write_at(idx.wrapping_add(posted), frame.into_addr()) };
            posted += 1;
        }
        self.rings.fill.submit(posted);
        self.wake_fill_if_needed()?;
        Ok(posted)
    }

    /// Phase 2: take a batch off the Receive ring and shape each packet.
    ///
    /// Each delayed packet is stamped when it is queued. Returns
    /// `(received, dropped)`.
    pub fn receive(&mut self, now: &impl Fn() -> Instant) -> io::Result<(u32, u32)> {
        let (count, start) = self.rings.rx.peek(self.batches.rx);
        if count == 0 {
            return Ok((0, 0));
        }

        for i in 0..count {
            let desc = unsafe { self.rings.rx.read_at(start.wrapping_add(i)) };
            let frame = Frame::claim(desc.addr);
            match self.policy.decide() {
                Verdict::Drop => self.drops.push(frame),
                Verdict::Delay(delay) => self.queue.push(PendingPacket {
                    due: now() + delay,
                    frame,
                    len: desc.len,
                }),
            }
        }
        self.rings.rx.release(count);

        let dropped = self.drops.len() as u32;
        self.stats.received += count as u64;
        self.stats.dropped += dropped as u64;
        self.stats.delayed += (count - dropped) as u64;

        self.return_dropped()?;
        Ok((count, dropped))
    }

    /// Put dropped frames straight back on the Fill ring.
    ///
    /// Whatever does not fit goes to the free pool, from where `refill`
    /// offers it again once the driver has drained Fill.
    pub fn return_dropped(&mut self) -> io::Result<u32> {
        if self.drops.is_empty() {
            return Ok(0);
        }

        let (granted, idx) = self.rings.fill.reserve(self.drops.len() as u32);
        for (i, frame) in self.drops.drain(..granted as usize).enumerate() {
            unsafe { self.rings.fill.write_at(idx.wrapping_add(i as u32), frame.into_addr()) };
        }

        if !self.drops.is_empty() {
            let parked = self.drops.len();
            for frame in self.drops.drain(..) {
                self.pool.release(frame);
            }
            self.stats.fill_backpressure += 1;
            self.stats.parked += parked as u64;
            trace!(parked, "fill ring full, parking dropped frames");
        }

        if granted > 0 {
            self.rings.fill.submit(granted);
            self.wake_fill_if_needed()?;
        }
        Ok(granted)
    }

    /// Phase 3: move due packets onto the Transmit ring.
    ///
    /// Only as many packets are drained as Transmit has room for, so the
    /// reservation always matches what gets written.
    pub fn transmit_ready(&mut self, now: Instant) -> io::Result<u32> {
        if !self.queue.has_ready(now) {
            return Ok(0);
        }

        let room = self.rings.tx.free_entries(self.batches.tx).min(self.batches.tx);
        if room == 0 {
            self.stats.tx_backpressure += 1;
            self.kick_tx_if_needed()?;
            return Ok(0);
        }

        self.ready.clear();
        let ready = self.queue.drain_ready(now, room as usize, &mut self.ready) as u32;
        let (granted, idx) = self.rings.tx.reserve(ready);

        let unsent = self.ready.split_off(granted as usize);
        for (i, packet) in self.ready.drain(..).enumerate() {
            let len = packet.len;
            let desc = XDPDesc {
                addr: packet.frame.into_addr(),
                len,
                options: 0,
            };
            unsafe { self.rings.tx.write_at(idx.wrapping_add(i as u32), desc) };
        }
        if !unsent.is_empty() {
            self.stats.tx_backpressure += 1;
            self.queue.requeue(unsent);
        }

        if granted > 0 {
            self.rings.tx.submit(granted);
            self.stats.transmitted += granted as u64;
            self.kick_tx_if_needed()?;
        }
        Ok(granted)
    }

    pub fn kick_tx_if_needed(&mut self) -> io::Result<()> {
        if self.rings.tx.needs_wakeup() {
            self.link.kick_tx()?;
            self.stats.tx_kicks += 1;
        }
        Ok(())
    }

    pub fn wake_fill_if_needed(&mut self) -> io::Result<()> {
        if self.rings.fill.needs_wakeup() {
            self.link.wake_fill()?;
            self.stats.fill_wakeups += 1;
        }
        Ok(())
    }

    pub fn stats(&self) -> ShaperStats {
        self.stats
    }

    /// Frames in the free pool.
    pub fn frames_free(&self) -> usize {
        self.pool.available()
    }

    /// Frames held in the delay queue.
    pub fn frames_pending(&self) -> usize {
        self.queue.len()
    }

    pub fn frames_total(&self) -> usize {
        self.pool.total()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.queue.next_due()
    }

    pub fn ring_occupancy(&self) -> RingOccupancy {
        RingOccupancy {
            fill: self.rings.fill.outstanding(),
            completion: self.rings.comp.outstanding(),
            rx: self.rings.rx.outstanding(),
            tx: self.rings.tx.outstanding(),
        }
    }

    pub fn packets_seen(&self) -> u64 {
        self.policy.packets_seen()
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}
