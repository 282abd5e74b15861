/// Receive/Transmit ring entry, laid out as `struct xdp_desc`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XDPDesc {
    pub addr: u64,
    pub len: u32,
    pub options: u32,
}
