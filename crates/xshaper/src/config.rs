use std::path::PathBuf;
use std::time::Duration;

use xshaper_core::sys::if_xdp::{XDP_COPY, XDP_USE_NEED_WAKEUP, XDP_ZEROCOPY};
use xshaper_core::umem::layout::UmemLayout;

use crate::error::ShaperError;

pub const DEFAULT_FRAME_SIZE: u32 = 4096;
pub const DEFAULT_FRAME_COUNT: u32 = 4096;
pub const DEFAULT_RX_RING_SIZE: u32 = 1024;
pub const DEFAULT_TX_RING_SIZE: u32 = 1024;
pub const DEFAULT_FILL_RING_SIZE: u32 = 2048;
pub const DEFAULT_COMPLETION_RING_SIZE: u32 = 2048;
pub const DEFAULT_BATCH: u32 = 64;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_DROP_NTH: u32 = 10;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5);

/// Where the redirect program is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachMode {
    /// Generic (SKB) mode. Works on every interface, slower.
    Generic,
    /// Native driver mode.
    #[default]
    Driver,
}

impl AttachMode {
    pub fn xdp_flags(self) -> aya::programs::XdpFlags {
        match self {
            AttachMode::Generic => aya::programs::XdpFlags::SKB_MODE,
            AttachMode::Driver => aya::programs::XdpFlags::DRV_MODE,
        }
    }
}

/// How the socket shares frames with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Driver copies packets in and out of UMEM. Widely supported.
    #[default]
    Copy,
    /// Driver DMAs straight into UMEM.
    ZeroCopy,
}

impl BindMode {
    /// Bind flags; need-wakeup is always requested.
    pub fn bind_flags(self) -> u16 {
        let mode = match self {
            BindMode::Copy => XDP_COPY,
            BindMode::ZeroCopy => XDP_ZEROCOPY,
        };
        mode | XDP_USE_NEED_WAKEUP
    }
}

/// Per-phase batch limits of the drive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batches {
    pub rx: u32,
    pub tx: u32,
    pub completion: u32,
}

impl Default for Batches {
    fn default() -> Self {
        Self {
            rx: DEFAULT_BATCH,
            tx: DEFAULT_BATCH,
            completion: DEFAULT_BATCH,
        }
    }
}

/// Ring sizes, in entries. Each must be a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSizes {
    pub rx: u32,
    pub tx: u32,
    pub fill: u32,
    pub completion: u32,
}

impl Default for RingSizes {
    fn default() -> Self {
        Self {
            rx: DEFAULT_RX_RING_SIZE,
            tx: DEFAULT_TX_RING_SIZE,
            fill: DEFAULT_FILL_RING_SIZE,
            completion: DEFAULT_COMPLETION_RING_SIZE,
        }
    }
}

/// Everything fixed at startup. Nothing here changes once the shaper runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaperConfig {
    pub interface: String,
    pub queue_id: u32,
    pub delay: Duration,
    /// Drop every Nth received packet; 0 disables dropping.
    pub drop_nth: u32,
    pub attach_mode: AttachMode,
    pub bind_mode: BindMode,
    pub frame_size: u32,
    pub frame_count: u32,
    pub rings: RingSizes,
    pub batches: Batches,
    /// How long an idle loop blocks on the socket before re-checking the stop flag.
    pub idle_timeout: Duration,
    /// Compiled redirect program; searched for under `target/` when unset.
    pub xdp_object: Option<PathBuf>,
}

impl ShaperConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            queue_id: 0,
            delay: DEFAULT_DELAY,
            drop_nth: DEFAULT_DROP_NTH,
            attach_mode: AttachMode::default(),
            bind_mode: BindMode::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            frame_count: DEFAULT_FRAME_COUNT,
            rings: RingSizes::default(),
            batches: Batches::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            xdp_object: None,
        }
    }

    pub fn validate(&self) -> Result<(), ShaperError> {
        if self.interface.is_empty() {
            return Err(ShaperError::InvalidConfiguration("interface name is empty".into()));
        }
        for (name, size) in [
            ("rx", self.rings.rx),
            ("tx", self.rings.tx),
            ("fill", self.rings.fill),
            ("completion", self.rings.completion),
        ] {
            if size == 0 || !size.is_power_of_two() {
                return Err(ShaperError::InvalidConfiguration(format!(
                    "{name} ring size {size} must be a non-zero power of two"
                )));
            }
        }
        if self.batches.rx == 0 || self.batches.tx == 0 || self.batches.completion == 0 {
            return Err(ShaperError::InvalidConfiguration("batch sizes must be non-zero".into()));
        }
        self.layout()?;
        Ok(())
    }

    pub fn layout(&self) -> Result<UmemLayout, ShaperError> {
        UmemLayout::new(self.frame_size, self.frame_count)
            .map_err(|e| ShaperError::InvalidConfiguration(e.to_string()))
    }
}
