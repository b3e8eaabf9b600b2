//! Blocking IPv4 UDP endpoint construction.
//!
//! Both the sender and the receiver bind a local datagram socket with
//! `SO_REUSEADDR` and blocking I/O. All configuration happens here so a
//! failed endpoint surfaces as one typed setup error; the file descriptor
//! closes exactly once when the returned socket drops.

use std::net::{SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::MjetError;

/// Create a blocking IPv4 datagram socket bound to `addr`.
///
/// `SO_REUSEADDR` is set so a restarted pipeline can rebind a port still
/// in the kernel's grace period. Non-blocking mode is explicitly cleared:
/// the pipeline's suspension points are the blocking `recv`/`send` calls.
pub fn bind(addr: SocketAddrV4) -> Result<UdpSocket, MjetError> {
    let unavailable = |source| MjetError::Endpoint { addr, source };

    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(unavailable)?;
    socket.set_reuse_address(true).map_err(unavailable)?;
    socket.set_nonblocking(false).map_err(unavailable)?;
    socket.bind(&addr.into()).map_err(unavailable)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn bind_ephemeral() {
        let socket = bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() != 0);
    }

    #[test]
    fn rebind_same_port_allowed() {
        let first = bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = match first.local_addr().unwrap() {
            std::net::SocketAddr::V4(a) => a.port(),
            _ => unreachable!(),
        };
        drop(first);
        // The port just left TIME_WAIT-free UDP; SO_REUSEADDR makes this
        // deterministic rather than racing the kernel.
        bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}
