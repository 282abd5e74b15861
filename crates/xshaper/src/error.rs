use std::io;

use thiserror::Error;

/// Startup failures. Once the drive loop runs, ring shortages are ordinary
/// zero results and never surface here.
#[derive(Error, Debug)]
pub enum ShaperError {
    #[error("interface {name:?} not found")]
    InterfaceNotFound {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("permission denied (run as root to attach XDP programs)")]
    PermissionDenied,

    #[error("failed to raise RLIMIT_MEMLOCK: {0}")]
    MemlockLimit(#[source] io::Error),

    #[error("{step} failed: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("XDP program not found: {0}")]
    ProgramNotFound(String),

    #[error("failed to load eBPF object: {0}")]
    EbpfLoad(#[from] aya::EbpfError),

    #[error("XDP program error: {0}")]
    Program(#[from] aya::programs::ProgramError),

    #[error("XSK map error: {0}")]
    Map(#[from] aya::maps::MapError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ShaperError {
    pub(crate) fn setup(step: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| ShaperError::Setup { step, source }
    }
}
