pub mod if_xdp;
pub mod limits;
pub mod mmap;
pub mod netlink;
pub mod socket;
pub mod utils;
