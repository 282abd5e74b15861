use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aya::maps::XskMap;
use aya::programs::{Xdp, XdpFlags};
use aya::Ebpf;
use tracing::{debug, info};
use walkdir::WalkDir;
use xshaper_core::ring::{ConsumerRing, ProducerRing, XDPDesc};
use xshaper_core::sys::if_xdp::{
    XdpRingOffset, XDP_PGOFF_RX_RING, XDP_PGOFF_TX_RING, XDP_RX_RING, XDP_TX_RING,
    XDP_UMEM_COMPLETION_RING, XDP_UMEM_FILL_RING, XDP_UMEM_PGOFF_COMPLETION_RING,
    XDP_UMEM_PGOFF_FILL_RING,
};
use xshaper_core::sys::limits::{is_privileged, raise_memlock_limit};
use xshaper_core::sys::mmap::MmapArea;
use xshaper_core::sys::netlink::detach_xdp;
use xshaper_core::sys::socket::{
    bind_socket, create_xsk_socket, get_mmap_offsets, mmap_range, set_ring_size, set_umem_reg,
    RawFd,
};
use xshaper_core::sys::utils::if_nametoindex;
use xshaper_core::umem::mmap::UmemRegion;

use crate::config::{AttachMode, BindMode, ShaperConfig};
use crate::engine::Shaper;
use crate::error::ShaperError;
use crate::raw::{Rings, XskLink, XskSocket};

const PROGRAM_NAME: &str = "xshaper";
const XSK_MAP_NAME: &str = "XSKS_MAP";
const OBJECT_SUFFIX: &str = "bpfel-unknown-none/release/xshaper";
const SEARCH_ROOTS: [&str; 2] = ["target", "crates/xshaper-ebpf/target"];

// Every attach mode a leftover program could sit in; empty is the kernel default.
const CLEAR_MODES: [XdpFlags; 4] = [
    XdpFlags::SKB_MODE,
    XdpFlags::DRV_MODE,
    XdpFlags::HW_MODE,
    XdpFlags::empty(),
];

const ADDR_ENTRY: u64 = std::mem::size_of::<u64>() as u64;
const DESC_ENTRY: u64 = std::mem::size_of::<XDPDesc>() as u64;

pub struct ShaperBuilder {
    config: ShaperConfig,
}

impl ShaperBuilder {
    pub fn new(interface: &str) -> Self {
        Self::from_config(ShaperConfig::new(interface))
    }

    pub fn from_config(config: ShaperConfig) -> Self {
        Self { config }
    }

    pub fn queue_id(mut self, id: u32) -> Self {
        self.config.queue_id = id;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn drop_nth(mut self, n: u32) -> Self {
        self.config.drop_nth = n;
        self
    }

    pub fn attach_mode(mut self, mode: AttachMode) -> Self {
        self.config.attach_mode = mode;
        self
    }

    pub fn bind_mode(mut self, mode: BindMode) -> Self {
        self.config.bind_mode = mode;
        self
    }

    pub fn frame_count(mut self, count: u32) -> Self {
        self.config.frame_count = count;
        self
    }

    pub fn xdp_object(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.xdp_object = Some(path.into());
        self
    }

    pub fn config(&self) -> &ShaperConfig {
        &self.config
    }

    pub fn build(self) -> Result<Shaper<XskLink>, ShaperError> {
        let config = self.config.clone();
        let (rings, link) = self.build_raw()?.into_parts();
        Shaper::new(rings, link, &config)
    }

    /// Every setup step, in order. The first failure aborts and everything
    /// created so far is released on drop.
    pub fn build_raw(self) -> Result<XskSocket, ShaperError> {
        let config = self.config;
        config.validate()?;

        let ifindex = if_nametoindex(&config.interface).map_err(|source| {
            ShaperError::InterfaceNotFound {
                name: config.interface.clone(),
                source,
            }
        })?;
        if !is_privileged() {
            return Err(ShaperError::PermissionDenied);
        }
        raise_memlock_limit().map_err(ShaperError::MemlockLimit)?;

        let layout = config.layout()?;
        let umem = UmemRegion::new(layout).map_err(ShaperError::setup("UMEM allocation"))?;
        debug!(frames = layout.frame_count, frame_size = layout.frame_size, "UMEM allocated");

        let fd_owned = create_xsk_socket().map_err(ShaperError::setup("socket"))?;
        let fd = fd_owned.as_raw_fd();

        set_umem_reg(fd, umem.as_ptr() as u64, umem.len() as u64, layout.frame_size, 0)
            .map_err(ShaperError::setup("UMEM registration"))?;

        let sizes = config.rings;
        set_ring_size(fd, XDP_UMEM_FILL_RING, sizes.fill).map_err(ShaperError::setup("fill ring size"))?;
        set_ring_size(fd, XDP_UMEM_COMPLETION_RING, sizes.completion)
            .map_err(ShaperError::setup("completion ring size"))?;
        set_ring_size(fd, XDP_RX_RING, sizes.rx).map_err(ShaperError::setup("rx ring size"))?;
        set_ring_size(fd, XDP_TX_RING, sizes.tx).map_err(ShaperError::setup("tx ring size"))?;

        let off = get_mmap_offsets(fd).map_err(ShaperError::setup("ring offsets"))?;

        let fill_map = map_ring(fd, &off.fr, sizes.fill, ADDR_ENTRY, XDP_UMEM_PGOFF_FILL_RING)?;
        let comp_map = map_ring(fd, &off.cr, sizes.completion, ADDR_ENTRY, XDP_UMEM_PGOFF_COMPLETION_RING)?;
        let rx_map = map_ring(fd, &off.rx, sizes.rx, DESC_ENTRY, XDP_PGOFF_RX_RING)?;
        let tx_map = map_ring(fd, &off.tx, sizes.tx, DESC_ENTRY, XDP_PGOFF_TX_RING)?;

        // Offsets come from the kernel for exactly these mappings.
        let rings = unsafe {
            Rings {
                fill: ProducerRing::new(
                    fill_map.at(off.fr.producer),
                    fill_map.at(off.fr.consumer),
                    fill_map.at(off.fr.flags),
                    fill_map.at::<u64>(off.fr.desc),
                    sizes.fill,
                ),
                comp: ConsumerRing::new(
                    comp_map.at(off.cr.producer),
                    comp_map.at(off.cr.consumer),
                    comp_map.at::<u64>(off.cr.desc),
                    sizes.completion,
                ),
                rx: ConsumerRing::new(
                    rx_map.at(off.rx.producer),
                    rx_map.at(off.rx.consumer),
                    rx_map.at::<XDPDesc>(off.rx.desc),
                    sizes.rx,
                ),
                tx: ProducerRing::new(
                    tx_map.at(off.tx.producer),
                    tx_map.at(off.tx.consumer),
                    tx_map.at(off.tx.flags),
                    tx_map.at::<XDPDesc>(off.tx.desc),
                    sizes.tx,
                ),
            }
        };
        debug!(?sizes, "rings mapped");

        bind_socket(fd, ifindex, config.queue_id, config.bind_mode.bind_flags())
            .map_err(ShaperError::setup("bind"))?;
        debug!(ifindex, queue = config.queue_id, mode = ?config.bind_mode, "socket bound");

        let maps = vec![fill_map, comp_map, rx_map, tx_map];
        let mut link = XskLink::new(fd_owned, umem, maps, ifindex, config.queue_id);
        debug!(bytes = link.mapped_bytes(), "socket memory mapped");

        let mut program = AyaProgram::default();
        install_program(&mut program, &config, ifindex, fd)?;
        if let Some(ebpf) = program.ebpf.take() {
            link.set_program(ebpf);
        }
        info!(
            interface = %config.interface,
            queue = config.queue_id,
            attach = ?config.attach_mode,
            "redirect program attached"
        );

        Ok(XskSocket::new(rings, link))
    }
}

fn map_ring(
    fd: RawFd,
    off: &XdpRingOffset,
    entries: u32,
    entry_size: u64,
    pgoff: u64,
) -> Result<MmapArea, ShaperError> {
    let len = (off.desc + entries as u64 * entry_size) as usize;
    unsafe {
        let ptr = mmap_range(fd, len, pgoff).map_err(ShaperError::setup("ring mmap"))?;
        MmapArea::from_raw(ptr, len).map_err(ShaperError::setup("ring mmap"))
    }
}

/// Kernel-side steps around the redirect program.
trait ProgramSetup {
    /// Remove any program attached to `ifindex` in the mode given by `flags`.
    fn clear(&mut self, ifindex: u32, flags: XdpFlags) -> io::Result<()>;

    fn load_and_attach(&mut self, config: &ShaperConfig) -> Result<(), ShaperError>;

    /// Point the queue's map slot at the socket.
    fn register(&mut self, queue_id: u32, fd: RawFd) -> Result<(), ShaperError>;
}

/// Clear leftovers from every mode, then attach and register.
///
/// A program from an earlier run that was never detached would otherwise make
/// the attach fail. Clearing is best effort; a mode with nothing attached is
/// not an error.
fn install_program(
    setup: &mut impl ProgramSetup,
    config: &ShaperConfig,
    ifindex: u32,
    fd: RawFd,
) -> Result<(), ShaperError> {
    for flags in CLEAR_MODES {
        if let Err(err) = setup.clear(ifindex, flags) {
            debug!(ifindex, ?flags, %err, "could not clear XDP program");
        }
    }
    setup.load_and_attach(config)?;
    setup.register(config.queue_id, fd)
}

#[derive(Default)]
struct AyaProgram {
    ebpf: Option<Ebpf>,
}

impl ProgramSetup for AyaProgram {
    fn clear(&mut self, ifindex: u32, flags: XdpFlags) -> io::Result<()> {
        detach_xdp(ifindex, flags.bits())
    }

    fn load_and_attach(&mut self, config: &ShaperConfig) -> Result<(), ShaperError> {
        let path = match &config.xdp_object {
            Some(path) => path.clone(),
            None => find_xdp_object(Path::new("."))
                .ok_or_else(|| ShaperError::ProgramNotFound(format!("no {OBJECT_SUFFIX} under target/")))?,
        };
        debug!(path = %path.display(), "loading eBPF object");

        let mut ebpf = Ebpf::load_file(&path)?;
        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| ShaperError::ProgramNotFound(PROGRAM_NAME.to_string()))?
            .try_into()?;
        program.load()?;
        program.attach(&config.interface, config.attach_mode.xdp_flags())?;
        self.ebpf = Some(ebpf);
        Ok(())
    }

    fn register(&mut self, queue_id: u32, fd: RawFd) -> Result<(), ShaperError> {
        let ebpf = self
            .ebpf
            .as_mut()
            .ok_or_else(|| ShaperError::ProgramNotFound(PROGRAM_NAME.to_string()))?;
        let map = ebpf
            .map_mut(XSK_MAP_NAME)
            .ok_or_else(|| ShaperError::ProgramNotFound(XSK_MAP_NAME.to_string()))?;
        let mut xsks = XskMap::try_from(map)?;
        xsks.set(queue_id, fd, 0)?;
        Ok(())
    }
}

/// Search the usual build output directories under `root` for the compiled
/// redirect program.
pub fn find_xdp_object(root: &Path) -> Option<PathBuf> {
    SEARCH_ROOTS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .find(|entry| entry.file_type().is_file() && entry.path().ends_with(OBJECT_SUFFIX))
        .map(|entry| entry.into_path())
}
