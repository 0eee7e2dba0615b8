//! Poll-driven event loop.
//!
//! One thread, one `poll(2)` per iteration. The loop polls every handle in
//! the face manager's snapshot (TCP faces through a bounded
//! [`TcpPollSet`]), then dispatches:
//!
//! ```text
//!   readiness on        action
//!   ------------        ------
//!   TCP / local stream  accept_pending
//!   UDP / NDN listener  receive_datagram, deliver to the sender's face
//!   face                receive, deliver; close on a fatal error
//!   face with backlog   flush_pending on writability
//! ```
//!
//! Frames go to a [`FrameHandler`], the seam to the forwarding engine.

mod shutdown;

pub use shutdown::ShutdownFlag;

use std::os::fd::BorrowedFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::core::{FaceError, FaceId, Protocol};
use crate::face::{FaceManager, PollRole, TcpPollSet};

/// Default bound on TCP faces polled per iteration.
pub const DEFAULT_TCP_POLL_CAPACITY: usize = 256;

/// Default poll timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Datagrams drained from one listener per iteration.
const DATAGRAM_BURST: usize = 64;

/// Receiver of inbound bytes.
pub trait FrameHandler {
    /// Bytes buffered on `face` are available.
    ///
    /// Returns how many leading bytes were consumed; the rest stay buffered
    /// until more arrive.
    fn on_frame(&mut self, faces: &mut FaceManager, face: FaceId, data: &[u8]) -> usize;

    /// `face` was closed after a fatal error or peer shutdown.
    fn on_face_closed(&mut self, _face: FaceId) {}
}

/// Readiness of one polled handle.
#[derive(Debug, Clone, Copy)]
struct Ready {
    face: FaceId,
    role: PollRole,
    readable: bool,
    writable: bool,
}

/// Single-threaded event loop over a [`FaceManager`].
#[derive(Debug)]
pub struct EventLoop<H> {
    faces: FaceManager,
    handler: H,
    tcp_set: TcpPollSet,
    poll_timeout: Duration,
}

impl<H: FrameHandler> EventLoop<H> {
    /// Create an event loop.
    pub fn new(faces: FaceManager, handler: H) -> Self {
        Self {
            faces,
            handler,
            tcp_set: TcpPollSet::new(DEFAULT_TCP_POLL_CAPACITY),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Set the poll timeout (capped at `u16::MAX` milliseconds).
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the bound on TCP faces polled per iteration.
    pub fn with_tcp_capacity(mut self, capacity: usize) -> Self {
        self.tcp_set = TcpPollSet::new(capacity);
        self
    }

    /// The face manager.
    pub fn faces(&self) -> &FaceManager {
        &self.faces
    }

    /// The face manager, mutably.
    pub fn faces_mut(&mut self) -> &mut FaceManager {
        &mut self.faces
    }

    /// The frame handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Take the loop apart.
    pub fn into_parts(self) -> (FaceManager, H) {
        (self.faces, self.handler)
    }

    /// Run until `shutdown` is raised, then close every face.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> nix::Result<()> {
        tracing::info!(faces = self.faces.table().len(), "event loop started");
        while !shutdown.is_raised() {
            self.run_once()?;
        }
        tracing::info!("event loop stopping");
        self.faces.close_all();
        Ok(())
    }

    /// One poll and dispatch round. Returns the number of ready handles.
    pub fn run_once(&mut self) -> nix::Result<usize> {
        self.faces.refresh_tcp_poll_set(&mut self.tcp_set);

        let ready = {
            let mut entries: Vec<(FaceId, PollRole, BorrowedFd<'_>)> = self
                .faces
                .snapshot_for_polling()
                .filter(|e| e.role != PollRole::Face(Protocol::Tcp))
                .map(|e| (e.face, e.role, e.fd))
                .collect();
            entries.extend(self.tcp_set.iter().filter_map(|slot| {
                let face = self.faces.get_face(slot.face)?;
                Some((slot.face, PollRole::Face(Protocol::Tcp), face.handle()))
            }));

            let mut fds: Vec<PollFd<'_>> = entries
                .iter()
                .map(|(face, _, fd)| PollFd::new(*fd, self.interest(*face)))
                .collect();
            let timeout = u16::try_from(self.poll_timeout.as_millis()).unwrap_or(u16::MAX);
            match poll(&mut fds, PollTimeout::from(timeout)) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(0),
                Err(e) => return Err(e),
            }

            let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            entries
                .iter()
                .zip(&fds)
                .filter_map(|((face, role, _), fd)| {
                    let revents = fd.revents().filter(|r| !r.is_empty())?;
                    Some(Ready {
                        face: *face,
                        role: *role,
                        readable: revents.intersects(readable),
                        writable: revents.contains(PollFlags::POLLOUT),
                    })
                })
                .collect::<Vec<_>>()
        };

        for event in &ready {
            if event.writable {
                self.flush_face(event.face);
                if !self.faces.check_active(event.face) {
                    continue;
                }
            }
            if !event.readable {
                continue;
            }
            match event.role {
                PollRole::Accept => self.accept(),
                PollRole::Datagram(_) => self.drain_datagrams(event.face),
                PollRole::Face(_) => self.read_face(event.face),
            }
        }
        Ok(ready.len())
    }

    /// Poll flags for a handle: writability too while a backlog is queued.
    fn interest(&self, face: FaceId) -> PollFlags {
        match self.faces.get_face(face) {
            Some(f) if f.pending_len() > 0 => PollFlags::POLLIN | PollFlags::POLLOUT,
            _ => PollFlags::POLLIN,
        }
    }

    fn flush_face(&mut self, face: FaceId) {
        match self.faces.flush_pending(face) {
            Ok(0) => tracing::trace!(%face, "backlog drained"),
            Ok(left) => tracing::trace!(%face, left, "backlog partially flushed"),
            Err(e) => self.handle_error(face, e),
        }
    }

    fn accept(&mut self) {
        match self.faces.accept_pending() {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "connections accepted"),
            Err(e) if e.is_resource_exhaustion() => {
                tracing::warn!(error = %e, "accept deferred");
            }
            Err(e) => tracing::error!(error = %e, "accept failed"),
        }
    }

    fn drain_datagrams(&mut self, listener: FaceId) {
        for _ in 0..DATAGRAM_BURST {
            match self.faces.receive_datagram(listener) {
                Ok(Some(face)) => self.deliver(face),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(face = %listener, error = %e, "datagram receive failed");
                    break;
                }
            }
        }
    }

    fn read_face(&mut self, face: FaceId) {
        match self.faces.receive(face) {
            Ok(Some(_)) => self.deliver(face),
            Ok(None) => {}
            Err(e) => self.handle_error(face, e),
        }
    }

    fn deliver(&mut self, face: FaceId) {
        let data = self.faces.buffered(face).to_vec();
        if data.is_empty() {
            return;
        }
        let consumed = self.handler.on_frame(&mut self.faces, face, &data);
        if self.faces.check_active(face) {
            if let Err(e) = self.faces.consume(face, consumed.min(data.len())) {
                tracing::debug!(%face, error = %e, "consume skipped");
            }
        }
    }

    fn handle_error(&mut self, face: FaceId, error: FaceError) {
        if error.is_retryable() {
            return;
        }
        if error.is_fatal() {
            tracing::debug!(%face, error = %error, "closing face");
            if self.faces.close(face).is_ok() {
                self.handler.on_face_closed(face);
            }
            return;
        }
        tracing::warn!(%face, error = %error, "face error");
    }
}
