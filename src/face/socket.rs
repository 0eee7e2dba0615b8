//! Socket construction for listeners and outbound faces.
//!
//! Every socket leaves here non-blocking. IPv6 sockets are IPv6-only so the
//! v4 and v6 listeners of a role can share one port.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};

use crate::core::IpFamily;

fn new_socket(addr: &SocketAddr, ty: Type, protocol: SockProtocol) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(*addr), ty, Some(protocol))?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    Ok(socket)
}

/// Bind a UDP listener on `addr` with `SO_REUSEADDR`.
pub(crate) fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = new_socket(&addr, Type::DGRAM, SockProtocol::UDP)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Bind and listen on `addr` with `SO_REUSEADDR`.
pub(crate) fn bind_tcp(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = new_socket(&addr, Type::STREAM, SockProtocol::TCP)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Open an unconnected UDP socket on an ephemeral port in the family of
/// `remote`.
///
/// The socket stays unconnected so an ICMP port-unreachable from a
/// restarting neighbor is never reported back on it.
pub(crate) fn open_udp(remote: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(IpFamily::of(&remote).wildcard(0))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Start a non-blocking TCP connect to `remote`.
///
/// The connection completes in the background; the first write or read
/// reports a refused connection.
pub(crate) fn connect_tcp(remote: SocketAddr) -> io::Result<TcpStream> {
    let socket = new_socket(&remote, Type::STREAM, SockProtocol::TCP)?;
    socket.set_nonblocking(true)?;
    match socket.connect(&remote.into()) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
    }
    Ok(socket.into())
}
