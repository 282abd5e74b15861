use tracing::info;

/// Running totals kept by the drive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaperStats {
    pub received: u64,
    pub dropped: u64,
    pub delayed: u64,
    pub transmitted: u64,
    /// Completion entries handed back to the Fill ring.
    pub reclaimed: u64,
    /// Dropped frames that went to the free pool because Fill stayed full.
    pub parked: u64,
    pub tx_kicks: u64,
    pub fill_wakeups: u64,
    /// Times a Fill reservation came back empty while frames were waiting.
    pub fill_backpressure: u64,
    /// Times ready packets stayed queued because Transmit was full.
    pub tx_backpressure: u64,
    pub idle_waits: u64,
}

impl ShaperStats {
    pub fn log_summary(&self) {
        info!(
            received = self.received,
            dropped = self.dropped,
            delayed = self.delayed,
            transmitted = self.transmitted,
            reclaimed = self.reclaimed,
            parked = self.parked,
            tx_kicks = self.tx_kicks,
            fill_wakeups = self.fill_wakeups,
            fill_backpressure = self.fill_backpressure,
            tx_backpressure = self.tx_backpressure,
            idle_waits = self.idle_waits,
            "shaper statistics"
        );
    }
}
