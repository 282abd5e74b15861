use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xshaper::config::{AttachMode, BindMode};
use xshaper::signal::install_stop_handlers;
use xshaper::{ShaperBuilder, ShaperConfig, ShaperError};

/// Delay every packet on one NIC queue and drop every Nth one.
#[derive(Parser, Debug)]
#[command(name = "xshaper", version)]
struct Cli {
    /// Interface to shape.
    #[arg(short, long)]
    interface: String,

    /// Receive queue to bind.
    #[arg(short, long, default_value_t = 0)]
    queue: u32,

    /// Delay applied to every forwarded packet, in milliseconds.
    #[arg(long, default_value_t = 10)]
    delay_ms: u64,

    /// Drop every Nth packet; 0 disables dropping.
    #[arg(long, default_value_t = 10)]
    drop_nth: u32,

    /// Attach in generic (SKB) mode instead of native driver mode.
    #[arg(long)]
    skb_mode: bool,

    /// Bind in zero-copy mode.
    #[arg(long)]
    zero_copy: bool,

    /// Number of UMEM frames.
    #[arg(long, default_value_t = 4096)]
    frames: u32,

    /// Compiled redirect program. Searched for under target/ when omitted.
    #[arg(long)]
    xdp_object: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> ShaperConfig {
        let mut config = ShaperConfig::new(self.interface);
        config.queue_id = self.queue;
        config.delay = Duration::from_millis(self.delay_ms);
        config.drop_nth = self.drop_nth;
        config.attach_mode = if self.skb_mode {
            AttachMode::Generic
        } else {
            AttachMode::Driver
        };
        config.bind_mode = if self.zero_copy {
            BindMode::ZeroCopy
        } else {
            BindMode::Copy
        };
        config.frame_count = self.frames;
        config.xdp_object = self.xdp_object;
        config
    }
}

fn run(config: ShaperConfig) -> Result<(), ShaperError> {
    let stop = install_stop_handlers();

    info!(
        interface = %config.interface,
        queue = config.queue_id,
        delay_ms = config.delay.as_millis() as u64,
        drop_nth = config.drop_nth,
        "starting"
    );
    let mut shaper = ShaperBuilder::from_config(config).build()?;
    shaper.run(stop)?;

    shaper.stats().log_summary();
    match shaper.link().statistics() {
        Ok(kernel) => info!(
            rx_dropped = kernel.rx_dropped,
            rx_invalid = kernel.rx_invalid_descs,
            tx_invalid = kernel.tx_invalid_descs,
            rx_ring_full = kernel.rx_ring_full,
            fill_ring_empty = kernel.rx_fill_ring_empty_descs,
            tx_ring_empty = kernel.tx_ring_empty_descs,
            "kernel socket statistics"
        ),
        Err(e) => warn!(error = %e, "could not read kernel socket statistics"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli.into_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "xshaper failed");
            ExitCode::FAILURE
        }
    }
}
