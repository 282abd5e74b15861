use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};

use libc::{
    c_void, recv, sendto, sockaddr, sockaddr_nl, socket, socklen_t, AF_NETLINK, NETLINK_ROUTE,
    SOCK_CLOEXEC, SOCK_RAW,
};

// rtnetlink values from linux/rtnetlink.h, linux/netlink.h and linux/if_link.h.
const RTM_SETLINK: u16 = 19;
const NLMSG_ERROR: u16 = 2;
const NLM_F_REQUEST: u16 = 0x1;
const NLM_F_ACK: u16 = 0x4;
const NLA_F_NESTED: u16 = 1 << 15;
const IFLA_XDP: u16 = 43;
const IFLA_XDP_FD: u16 = 1;
const IFLA_XDP_FLAGS: u16 = 3;

const NLMSG_HDR_LEN: usize = 16;
const IFINFO_LEN: usize = 16;
const NLA_HDR_LEN: usize = 4;

/// Remove whatever XDP program is attached to `ifindex` in the mode given by
/// `flags` (0 for the kernel's default mode).
///
/// Programs held through a bpf link cannot be removed this way and report
/// `EBUSY`.
pub fn detach_xdp(ifindex: u32, flags: u32) -> io::Result<()> {
    let fd = unsafe { socket(AF_NETLINK, SOCK_RAW | SOCK_CLOEXEC, NETLINK_ROUTE) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let msg = setlink_xdp_message(ifindex, -1, flags, 1);
    let mut kernel: sockaddr_nl = unsafe { mem::zeroed() };
    kernel.nl_family = AF_NETLINK as u16;

    let sent = unsafe {
        sendto(
            fd.as_raw_fd(),
            msg.as_ptr() as *const c_void,
            msg.len(),
            0,
            &kernel as *const sockaddr_nl as *const sockaddr,
            mem::size_of::<sockaddr_nl>() as socklen_t,
        )
    };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut buf = [0u8; 4096];
    let len = unsafe { recv(fd.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }
    parse_ack(&buf[..len as usize])
}

/// `RTM_SETLINK` request carrying a nested `IFLA_XDP` attribute. The flags
/// attribute is left out when `flags` is 0.
pub(crate) fn setlink_xdp_message(ifindex: u32, prog_fd: i32, flags: u32, seq: u32) -> Vec<u8> {
    let mut xdp = Vec::with_capacity(16);
    push_attr(&mut xdp, IFLA_XDP_FD, &prog_fd.to_ne_bytes());
    if flags != 0 {
        push_attr(&mut xdp, IFLA_XDP_FLAGS, &flags.to_ne_bytes());
    }

    let total = NLMSG_HDR_LEN + IFINFO_LEN + NLA_HDR_LEN + xdp.len();
    let mut msg = Vec::with_capacity(total);
    msg.extend_from_slice(&(total as u32).to_ne_bytes());
    msg.extend_from_slice(&RTM_SETLINK.to_ne_bytes());
    msg.extend_from_slice(&(NLM_F_REQUEST | NLM_F_ACK).to_ne_bytes());
    msg.extend_from_slice(&seq.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes());

    // ifinfomsg: family, pad, type, index, flags, change
    msg.push(libc::AF_UNSPEC as u8);
    msg.push(0);
    msg.extend_from_slice(&0u16.to_ne_bytes());
    msg.extend_from_slice(&(ifindex as i32).to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes());

    push_attr(&mut msg, IFLA_XDP | NLA_F_NESTED, &xdp);
    msg
}

fn push_attr(buf: &mut Vec<u8>, kind: u16, payload: &[u8]) {
    let len = (NLA_HDR_LEN + payload.len()) as u16;
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&kind.to_ne_bytes());
    buf.extend_from_slice(payload);
    // Payloads here are 4-byte values, so no alignment padding is needed.
}

/// Turn the kernel's `NLMSG_ERROR` reply into a result. Error code 0 is an ack.
pub(crate) fn parse_ack(reply: &[u8]) -> io::Result<()> {
    if reply.len() < NLMSG_HDR_LEN + 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short netlink reply"));
    }
    let kind = u16::from_ne_bytes([reply[4], reply[5]]);
    if kind != NLMSG_ERROR {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected netlink message type {kind}"),
        ));
    }
    let code = i32::from_ne_bytes([
        reply[NLMSG_HDR_LEN],
        reply[NLMSG_HDR_LEN + 1],
        reply[NLMSG_HDR_LEN + 2],
        reply[NLMSG_HDR_LEN + 3],
    ]);
    if code < 0 {
        return Err(io::Error::from_raw_os_error(-code));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_ne_bytes([buf[at], buf[at + 1]])
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_detach_message_layout() {
        let msg = setlink_xdp_message(7, -1, 0x2, 9);
        assert_eq!(msg.len(), 52);
        assert_eq!(u32_at(&msg, 0), 52);
        assert_eq!(u16_at(&msg, 4), RTM_SETLINK);
        assert_eq!(u16_at(&msg, 6), NLM_F_REQUEST | NLM_F_ACK);
        assert_eq!(u32_at(&msg, 8), 9);
        assert_eq!(u32_at(&msg, 20), 7);

        let nested = NLMSG_HDR_LEN + IFINFO_LEN;
        assert_eq!(u16_at(&msg, nested), 20);
        assert_eq!(u16_at(&msg, nested + 2), IFLA_XDP | NLA_F_NESTED);
        assert_eq!(u16_at(&msg, nested + 6), IFLA_XDP_FD);
        assert_eq!(u32_at(&msg, nested + 8) as i32, -1);
        assert_eq!(u16_at(&msg, nested + 14), IFLA_XDP_FLAGS);
        assert_eq!(u32_at(&msg, nested + 16), 0x2);
    }

    #[test]
    fn test_default_mode_omits_flags() {
        let msg = setlink_xdp_message(3, -1, 0, 1);
        assert_eq!(msg.len(), 44);
        assert_eq!(u16_at(&msg, NLMSG_HDR_LEN + IFINFO_LEN), 12);
    }

    fn reply(kind: u16, code: i32) -> Vec<u8> {
        let mut buf = vec![0u8; NLMSG_HDR_LEN];
        buf[4..6].copy_from_slice(&kind.to_ne_bytes());
        buf.extend_from_slice(&code.to_ne_bytes());
        buf
    }

    #[test]
    fn test_ack_and_errors() {
        assert!(parse_ack(&reply(NLMSG_ERROR, 0)).is_ok());

        let err = parse_ack(&reply(NLMSG_ERROR, -libc::EBUSY)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));

        assert!(parse_ack(&reply(RTM_SETLINK, 0)).is_err());
        assert!(parse_ack(&[0u8; 8]).is_err());
    }
}
