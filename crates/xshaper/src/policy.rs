use std::time::Duration;

/// Outcome for one received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the frame straight back to the Fill ring.
    Drop,
    /// Hold the packet for the given time, then transmit it.
    Delay(Duration),
}

/// Fixed delay plus deterministic modulo-N drop.
///
/// The counter is 1-based: with `drop_nth = N` the Nth, 2Nth, ... packets are
/// dropped. `drop_nth = 0` never drops.
#[derive(Debug, Clone)]
pub struct ShapingPolicy {
    delay: Duration,
    drop_nth: u32,
    counter: u64,
}

impl ShapingPolicy {
    pub fn new(delay: Duration, drop_nth: u32) -> Self {
        Self {
            delay,
            drop_nth,
            counter: 0,
        }
    }

    #[inline]
    pub fn decide(&mut self) -> Verdict {
        self.counter += 1;
        if self.drop_nth > 0 && self.counter % self.drop_nth as u64 == 0 {
            Verdict::Drop
        } else {
            Verdict::Delay(self.delay)
        }
    }

    /// Packets observed so far.
    pub fn packets_seen(&self) -> u64 {
        self.counter
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn drop_nth(&self) -> u32 {
        self.drop_nth
    }
}
