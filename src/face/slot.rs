//! Face table entries.
//!
//! Each table slot is one of four variants. Reserved slots sit in
//! [`FaceSlot::Unallocated`] until their role is created, so a role can be
//! closed and recreated under the same identifier.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::{self, UnixDatagram, UnixListener, UnixStream};
use std::path::PathBuf;

use super::rtt::RttTracker;
use crate::core::constants::MAX_FRAME_LEN;
use crate::core::{FaceError, FaceId, FaceResult, Protocol, is_transient};

/// Bounded receive buffer with its fill length.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl RecvBuffer {
    /// Create an empty buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Bytes received and not yet consumed.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Current fill length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Check if no more bytes fit.
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Unused tail of the buffer, to be filled by a read.
    fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Mark `n` bytes of the spare region as filled.
    fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    /// Append bytes if they fit entirely. Returns false otherwise.
    pub fn append(&mut self, data: &[u8]) -> bool {
        if data.len() > self.buf.len() - self.len {
            return false;
        }
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        true
    }

    /// Drop the first `n` buffered bytes, keeping the rest in order.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Transport handle of a connected face.
#[derive(Debug)]
pub enum Transport {
    /// Connected UDP socket (UDP and NDN faces).
    Udp(UdpSocket),
    /// TCP connection.
    Tcp(TcpStream),
    /// Local stream connection from an application.
    LocalStream(UnixStream),
    /// Local datagram endpoint.
    LocalDatagram(UnixDatagram),
}

impl Transport {
    /// Check if bytes on this transport form a stream rather than datagrams.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Tcp(_) | Self::LocalStream(_))
    }

    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Self::Udp(s) => s.as_fd(),
            Self::Tcp(s) => s.as_fd(),
            Self::LocalStream(s) => s.as_fd(),
            Self::LocalDatagram(s) => s.as_fd(),
        }
    }
}

/// A face that carries frames: a network peer or a local application.
#[derive(Debug)]
pub struct Face {
    id: FaceId,
    protocol: Protocol,
    local: bool,
    transport: Transport,
    remote: Option<SocketAddr>,
    reply_to: Option<net::SocketAddr>,
    rx: RecvBuffer,
    pending: Vec<u8>,
    seqnum: u32,
    last_chunk: Option<u32>,
    rtt: RttTracker,
}

impl Face {
    /// Create a face around an open transport.
    pub(crate) fn new(
        id: FaceId,
        protocol: Protocol,
        transport: Transport,
        remote: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            protocol,
            local: protocol == Protocol::Local,
            transport,
            remote,
            reply_to: None,
            rx: RecvBuffer::with_capacity(MAX_FRAME_LEN),
            pending: Vec::new(),
            seqnum: 0,
            last_chunk: None,
            rtt: RttTracker::new(),
        }
    }

    /// Face identifier.
    pub fn id(&self) -> FaceId {
        self.id
    }

    /// Transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether this face leads to a local application.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Raw transport handle.
    pub fn fd(&self) -> RawFd {
        self.transport.as_fd().as_raw_fd()
    }

    /// Borrowed transport handle, for polling.
    pub fn handle(&self) -> BorrowedFd<'_> {
        self.transport.as_fd()
    }

    /// Remote network address, if any.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Outbound sequence counter.
    pub fn seqnum(&self) -> u32 {
        self.seqnum
    }

    /// Chunk number of the last content object sent.
    pub fn last_chunk(&self) -> Option<u32> {
        self.last_chunk
    }

    /// Receive buffer.
    pub fn rx(&self) -> &RecvBuffer {
        &self.rx
    }

    pub(crate) fn rx_mut(&mut self) -> &mut RecvBuffer {
        &mut self.rx
    }

    /// Bytes accepted by `send_*` but not yet taken by the kernel.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// RTT tracker of this neighbor.
    pub fn rtt(&self) -> &RttTracker {
        &self.rtt
    }

    pub(crate) fn rtt_mut(&mut self) -> &mut RttTracker {
        &mut self.rtt
    }

    /// Record a transmitted content object.
    pub(crate) fn count_object(&mut self, chunk: u32) {
        self.seqnum = self.seqnum.wrapping_add(1);
        self.last_chunk = Some(chunk);
    }

    /// Transmit one frame.
    ///
    /// Datagram transports send the frame atomically. Stream transports
    /// first drain the pending backlog; any remainder the kernel does not
    /// take is queued behind it. Nothing is queued when the call reports
    /// [`FaceError::WouldBlock`].
    pub(crate) fn send_frame(&mut self, frame: &[u8]) -> FaceResult<()> {
        if !self.transport.is_stream() {
            return self.send_datagram(frame);
        }

        self.flush()?;
        if !self.pending.is_empty() {
            return Err(FaceError::WouldBlock);
        }

        let written = self.write_some(frame)?;
        if written == 0 && !frame.is_empty() {
            return Err(FaceError::WouldBlock);
        }
        self.pending.extend_from_slice(&frame[written..]);
        Ok(())
    }

    /// Drain as much of the pending backlog as the kernel takes.
    ///
    /// Returns the number of bytes still pending.
    pub(crate) fn flush(&mut self) -> FaceResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let mut pending = std::mem::take(&mut self.pending);
        let result = self.write_some(&pending);
        if let Ok(written) = &result {
            pending.drain(..*written);
        }
        self.pending = pending;
        result.map(|_| self.pending.len())
    }

    /// Write until done or the kernel buffer is full.
    fn write_some(&mut self, data: &[u8]) -> FaceResult<usize> {
        let mut written = 0;
        while written < data.len() {
            let res = match &mut self.transport {
                Transport::Tcp(s) => s.write(&data[written..]),
                Transport::LocalStream(s) => s.write(&data[written..]),
                Transport::Udp(_) | Transport::LocalDatagram(_) => {
                    Err(io::Error::from(io::ErrorKind::Unsupported))
                }
            };
            match res {
                Ok(0) => {
                    return Err(FaceError::Transport {
                        face: self.id,
                        source: io::Error::from(io::ErrorKind::WriteZero),
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(FaceError::from_transport(self.id, e)),
            }
        }
        Ok(written)
    }

    fn send_datagram(&mut self, frame: &[u8]) -> FaceResult<()> {
        let res = match &self.transport {
            Transport::Udp(s) => match &self.remote {
                Some(remote) => s.send_to(frame, remote),
                None => return Err(FaceError::NotConnected(self.id)),
            },
            Transport::LocalDatagram(s) => match &self.reply_to {
                Some(addr) => s.send_to_addr(frame, addr),
                None => return Err(FaceError::NotConnected(self.id)),
            },
            Transport::Tcp(_) | Transport::LocalStream(_) => {
                Err(io::Error::from(io::ErrorKind::Unsupported))
            }
        };
        res.map(|_| ()).map_err(|e| FaceError::from_transport(self.id, e))
    }

    /// Read once from the transport into the receive buffer.
    ///
    /// Returns `Ok(None)` when nothing is available.
    pub(crate) fn fill(&mut self) -> FaceResult<Option<usize>> {
        if self.rx.is_full() {
            return Err(FaceError::BufferFull(self.id));
        }
        let res = match &mut self.transport {
            Transport::Udp(s) => match s.recv_from(self.rx.spare_mut()) {
                Ok((n, from)) if Some(from) == self.remote => Ok(n),
                Ok((_, from)) => {
                    tracing::trace!(face = %self.id, %from, "foreign datagram dropped");
                    return Ok(None);
                }
                Err(e) => Err(e),
            },
            Transport::Tcp(s) => s.read(self.rx.spare_mut()),
            Transport::LocalStream(s) => s.read(self.rx.spare_mut()),
            Transport::LocalDatagram(s) => match s.recv_from(self.rx.spare_mut()) {
                Ok((n, from)) => {
                    self.reply_to = Some(from);
                    Ok(n)
                }
                Err(e) => Err(e),
            },
        };
        match res {
            Ok(0) if self.transport.is_stream() => Err(FaceError::PeerClosed(self.id)),
            Ok(n) => {
                self.rx.advance(n);
                Ok(Some(n))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(FaceError::from_transport(self.id, e)),
        }
    }
}

/// Socket of a listening face.
#[derive(Debug)]
pub enum ListenSocket {
    /// UDP listener (UDP and NDN roles).
    Udp(UdpSocket),
    /// TCP listener.
    Tcp(TcpListener),
    /// Local stream listener.
    LocalStream(UnixListener),
}

/// A connection accepted from a listener.
#[derive(Debug)]
pub(crate) struct Accepted {
    pub transport: Transport,
    pub remote: Option<SocketAddr>,
}

/// Removes a filesystem socket name when the listener goes away.
#[derive(Debug)]
pub(crate) struct SocketPathGuard(pub PathBuf);

impl Drop for SocketPathGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            std::fs::remove_file(&self.0).ok();
        }
    }
}

/// A reserved face in the listening state.
#[derive(Debug)]
pub struct Listener {
    id: FaceId,
    protocol: Protocol,
    socket: ListenSocket,
    _path: Option<SocketPathGuard>,
}

impl Listener {
    pub(crate) fn new(
        id: FaceId,
        protocol: Protocol,
        socket: ListenSocket,
        path: Option<SocketPathGuard>,
    ) -> Self {
        Self {
            id,
            protocol,
            socket,
            _path: path,
        }
    }

    /// Reserved identifier of this listener.
    pub fn id(&self) -> FaceId {
        self.id
    }

    /// Protocol of faces created through this listener.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether readiness means pending connections rather than datagrams.
    pub fn accepts_connections(&self) -> bool {
        matches!(self.socket, ListenSocket::Tcp(_) | ListenSocket::LocalStream(_))
    }

    /// Raw handle.
    pub fn fd(&self) -> RawFd {
        self.handle().as_raw_fd()
    }

    /// Borrowed handle, for polling.
    pub fn handle(&self) -> BorrowedFd<'_> {
        match &self.socket {
            ListenSocket::Udp(s) => s.as_fd(),
            ListenSocket::Tcp(s) => s.as_fd(),
            ListenSocket::LocalStream(s) => s.as_fd(),
        }
    }

    /// Local address of a network listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            ListenSocket::Udp(s) => s.local_addr().ok(),
            ListenSocket::Tcp(s) => s.local_addr().ok(),
            ListenSocket::LocalStream(_) => None,
        }
    }

    /// Accept one pending connection and make it non-blocking.
    pub(crate) fn accept(&self) -> io::Result<Accepted> {
        match &self.socket {
            ListenSocket::Tcp(l) => {
                let (stream, remote) = l.accept()?;
                stream.set_nonblocking(true)?;
                Ok(Accepted {
                    transport: Transport::Tcp(stream),
                    remote: Some(remote),
                })
            }
            ListenSocket::LocalStream(l) => {
                let (stream, _) = l.accept()?;
                stream.set_nonblocking(true)?;
                Ok(Accepted {
                    transport: Transport::LocalStream(stream),
                    remote: None,
                })
            }
            ListenSocket::Udp(_) => Err(io::Error::from(io::ErrorKind::Unsupported)),
        }
    }

    /// Receive one datagram on a UDP listener.
    pub(crate) fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match &self.socket {
            ListenSocket::Udp(s) => s.recv_from(buf),
            ListenSocket::Tcp(_) | ListenSocket::LocalStream(_) => {
                Err(io::Error::from(io::ErrorKind::Unsupported))
            }
        }
    }
}

/// One entry of the face table.
#[derive(Debug, Default)]
pub enum FaceSlot {
    /// Free dynamic identifier, or a reserved role that is not open.
    #[default]
    Unallocated,
    /// Reserved listener role that is open.
    Listening(Listener),
    /// Local role carrying traffic itself (datagram local endpoint).
    Local(Face),
    /// Dynamically assigned face.
    Peer(Face),
}

impl FaceSlot {
    /// Check if the slot holds an open handle.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Unallocated)
    }

    /// The frame-carrying face in this slot, if any.
    pub fn face(&self) -> Option<&Face> {
        match self {
            Self::Local(f) | Self::Peer(f) => Some(f),
            Self::Unallocated | Self::Listening(_) => None,
        }
    }

    /// Raw handle of the slot.
    pub fn fd(&self) -> Option<RawFd> {
        match self {
            Self::Unallocated => None,
            Self::Listening(l) => Some(l.fd()),
            Self::Local(f) | Self::Peer(f) => Some(f.fd()),
        }
    }

    /// Protocol of the slot.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Unallocated => Protocol::Invalid,
            Self::Listening(l) => l.protocol(),
            Self::Local(f) | Self::Peer(f) => f.protocol(),
        }
    }

    /// Whether the slot belongs to the local application side.
    pub fn is_local(&self) -> bool {
        match self {
            Self::Unallocated => false,
            Self::Listening(l) => l.protocol() == Protocol::Local,
            Self::Local(f) | Self::Peer(f) => f.is_local(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_buffer_bounds() {
        let mut rx = RecvBuffer::with_capacity(8);
        assert!(rx.append(b"hello"));
        assert!(!rx.append(b"world"));
        assert_eq!(rx.filled(), b"hello");
        assert!(rx.append(b"!!!"));
        assert!(rx.is_full());
        assert_eq!(rx.len(), rx.capacity());
    }

    #[test]
    fn test_recv_buffer_consume_keeps_order() {
        let mut rx = RecvBuffer::with_capacity(16);
        rx.append(b"abcdef");
        rx.consume(2);
        assert_eq!(rx.filled(), b"cdef");
        rx.consume(100);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_stream_backlog_and_seqnum() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut face = Face::new(FaceId::new(20), Protocol::Local, Transport::LocalStream(a), None);

        face.send_frame(b"HP").unwrap();
        face.count_object(0);
        assert_eq!(face.seqnum(), 1);
        assert_eq!(face.last_chunk(), Some(0));
        assert_eq!(face.pending_len(), 0);

        let mut buf = [0u8; 2];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"HP");
    }

    #[test]
    fn test_fill_reports_peer_close() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut face = Face::new(FaceId::new(21), Protocol::Local, Transport::LocalStream(a), None);

        assert!(matches!(face.fill(), Ok(None)));
        drop(b);
        assert!(matches!(face.fill(), Err(FaceError::PeerClosed(_))));
    }

    #[test]
    fn test_datagram_local_needs_sender() {
        let (a, _b) = UnixDatagram::pair().unwrap();
        let mut face = Face::new(FaceId::LOCAL, Protocol::Local, Transport::LocalDatagram(a), None);
        assert!(matches!(
            face.send_frame(b"x"),
            Err(FaceError::NotConnected(_))
        ));
    }
}
