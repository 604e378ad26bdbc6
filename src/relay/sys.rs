//! `recvmsg`/`sendmsg` wrappers.
//!
//! std and tokio only expose payload + address for datagrams. The relay also
//! has to carry the ancillary (control) bytes across, so these go straight to
//! libc. Both calls expect a non-blocking socket and surface `WouldBlock`
//! untouched so they can run inside tokio's readiness loop.

use socket2::SockAddr;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

/// Outcome of a single `recvmsg`.
#[derive(Debug)]
pub struct ReceivedMsg {
    /// Payload bytes written into the payload buffer.
    pub len: usize,
    /// Ancillary bytes written into the control buffer.
    pub control_len: usize,
    /// Sender address.
    pub from: SocketAddr,
    /// Payload did not fit in the buffer (`MSG_TRUNC`).
    pub truncated: bool,
    /// Control data did not fit in the buffer (`MSG_CTRUNC`).
    pub control_truncated: bool,
}

/// Receive one datagram with its ancillary data and sender address.
pub fn recv_msg(fd: RawFd, payload: &mut [u8], control: &mut [u8]) -> io::Result<ReceivedMsg> {
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };

    // SAFETY: every pointer placed in the header refers to a buffer that
    // outlives the call, and the lengths match those buffers.
    let ((len, control_len, flags), addr) = unsafe {
        SockAddr::try_init(|storage, addr_len| {
            let mut hdr: libc::msghdr = mem::zeroed();
            hdr.msg_name = storage.cast();
            hdr.msg_namelen = *addr_len;
            hdr.msg_iov = &mut iov;
            hdr.msg_iovlen = 1;
            if !control.is_empty() {
                hdr.msg_control = control.as_mut_ptr().cast();
                hdr.msg_controllen = control.len() as _;
            }

            let n = libc::recvmsg(fd, &mut hdr, 0);
            if n < 0 {
                return Err(io::Error::last_os_error());
            }

            *addr_len = hdr.msg_namelen;
            Ok((n as usize, hdr.msg_controllen as usize, hdr.msg_flags))
        })?
    };

    let from = addr.as_socket().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "datagram sender is not an IP address",
        )
    })?;

    Ok(ReceivedMsg {
        len: len.min(payload.len()),
        control_len: control_len.min(control.len()),
        from,
        truncated: flags & libc::MSG_TRUNC != 0,
        control_truncated: flags & libc::MSG_CTRUNC != 0,
    })
}

/// Send one datagram carrying `payload` and `control` to `dest`.
///
/// Returns the number of payload bytes the kernel accepted. Control data is
/// either taken whole or the call fails.
pub fn send_msg(fd: RawFd, payload: &[u8], control: &[u8], dest: &SockAddr) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };

    // SAFETY: the kernel only reads through these pointers; all of them stay
    // valid for the duration of the call.
    let n = unsafe {
        let mut hdr: libc::msghdr = mem::zeroed();
        hdr.msg_name = dest.as_ptr() as *mut libc::c_void;
        hdr.msg_namelen = dest.len();
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;
        if !control.is_empty() {
            hdr.msg_control = control.as_ptr() as *mut libc::c_void;
            hdr.msg_controllen = control.len() as _;
        }
        libc::sendmsg(fd, &hdr, 0)
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::unix::io::AsRawFd;
    use std::time::Duration;

    fn pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        b.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        (a, b)
    }

    #[test]
    fn test_send_and_receive_msg() {
        let (a, b) = pair();
        let dest = SockAddr::from(b.local_addr().unwrap());

        let sent = send_msg(a.as_raw_fd(), &[0xDEu8, 0xAD, 0xBE, 0xEF], &[], &dest).unwrap();
        assert_eq!(sent, 4);

        let mut payload = [0u8; 64];
        let mut control = [0u8; 64];
        let msg = recv_msg(b.as_raw_fd(), &mut payload, &mut control).unwrap();
        assert_eq!(msg.len, 4);
        assert_eq!(&payload[..msg.len], &[0xDEu8, 0xAD, 0xBE, 0xEF]);
        assert_eq!(msg.control_len, 0);
        assert_eq!(msg.from, a.local_addr().unwrap());
        assert!(!msg.truncated);
    }

    #[test]
    fn test_truncated_payload_is_flagged() {
        let (a, b) = pair();
        a.send_to(b"0123456789", b.local_addr().unwrap()).unwrap();

        let mut payload = [0u8; 4];
        let msg = recv_msg(b.as_raw_fd(), &mut payload, &mut [0u8; 0]).unwrap();
        assert_eq!(msg.len, 4);
        assert_eq!(&payload, b"0123");
        assert!(msg.truncated);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_ancillary_data_echoed_verbatim() {
        use socket2::SockRef;

        let (peer, relay) = pair();
        SockRef::from(&peer).set_recv_tos(true).unwrap();
        SockRef::from(&relay).set_recv_tos(true).unwrap();
        SockRef::from(&peer).set_tos(0x28).unwrap();

        peer.send_to(b"hi", relay.local_addr().unwrap()).unwrap();

        let mut payload = [0u8; 64];
        let mut control = [0u8; 256];
        let msg = recv_msg(relay.as_raw_fd(), &mut payload, &mut control).unwrap();
        assert_eq!(&payload[..msg.len], b"hi");
        assert!(msg.control_len > 0, "TOS control message missing");

        let dest = SockAddr::from(msg.from);
        let sent = send_msg(
            relay.as_raw_fd(),
            &payload[..msg.len],
            &control[..msg.control_len],
            &dest,
        )
        .unwrap();
        assert_eq!(sent, 2);

        let mut echoed = [0u8; 64];
        let mut echoed_control = [0u8; 256];
        let back = recv_msg(peer.as_raw_fd(), &mut echoed, &mut echoed_control).unwrap();
        assert_eq!(&echoed[..back.len], b"hi");
        assert_eq!(back.from, relay.local_addr().unwrap());
        assert_eq!(
            &echoed_control[..back.control_len],
            &control[..msg.control_len]
        );
    }
}
