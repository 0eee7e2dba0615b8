//! Connection acceptor and the TCP poll set.

use std::io;
use std::os::fd::RawFd;

use super::manager::FaceManager;
use super::slot::{Face, FaceSlot};
use crate::core::constants::{FACEID_LISTEN_TCP_V4, FACEID_LISTEN_TCP_V6};
use crate::core::{FaceError, FaceId, FaceResult, Protocol, is_descriptor_exhaustion};

/// Listeners drained by [`FaceManager::accept_pending`].
const ACCEPTING_IDS: [FaceId; 3] = [
    FaceId::new(FACEID_LISTEN_TCP_V4),
    FaceId::new(FACEID_LISTEN_TCP_V6),
    FaceId::LOCAL,
];

/// One member of a [`TcpPollSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSlot {
    /// TCP face.
    pub face: FaceId,
    /// Its handle when added.
    pub fd: RawFd,
}

/// Bounded set of TCP faces owned by the caller's event loop.
#[derive(Debug, Clone)]
pub struct TcpPollSet {
    capacity: usize,
    slots: Vec<PollSlot>,
}

impl TcpPollSet {
    /// Create an empty set holding at most `capacity` faces.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Maximum number of members.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check if a face is a member.
    pub fn contains(&self, face: FaceId) -> bool {
        self.slots.iter().any(|s| s.face == face)
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PollSlot> {
        self.slots.iter()
    }
}

impl FaceManager {
    /// Accept every pending connection on the connection-oriented listeners.
    ///
    /// Each connection becomes a dynamic face with the listener's protocol.
    /// When no identifier is free the connection is refused and logged; the
    /// round goes on. Returns the number of faces created.
    pub fn accept_pending(&mut self) -> FaceResult<usize> {
        let mut created = 0;
        for listener_id in ACCEPTING_IDS {
            created += self.accept_from(listener_id)?;
        }
        Ok(created)
    }

    fn accept_from(&mut self, listener_id: FaceId) -> FaceResult<usize> {
        let mut created = 0;
        loop {
            let Some(FaceSlot::Listening(listener)) = self.table.slot(listener_id) else {
                return Ok(created);
            };
            if !listener.accepts_connections() {
                return Ok(created);
            }
            let protocol = listener.protocol();

            let accepted = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(created),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue;
                }
                Err(e) if is_descriptor_exhaustion(&e) => {
                    return Err(FaceError::ResourceExhausted(e));
                }
                Err(source) => {
                    return Err(FaceError::Transport {
                        face: listener_id,
                        source,
                    });
                }
            };

            if !self.table.has_free_id() {
                tracing::warn!(listener = %listener_id, peer = ?accepted.remote, "no free face id, connection refused");
                continue;
            }

            let id = self.table.insert_dynamic(|id| {
                Face::new(id, protocol, accepted.transport, accepted.remote)
            })?;
            tracing::debug!(face = %id, listener = %listener_id, %protocol, peer = ?accepted.remote, "connection accepted");
            created += 1;
        }
    }

    /// Reconcile `set` with the live TCP faces.
    ///
    /// Closed faces and faces whose handle changed are removed; new TCP faces
    /// are added up to the set's capacity. Returns the member count.
    pub fn refresh_tcp_poll_set(&self, set: &mut TcpPollSet) -> usize {
        set.slots.retain(|slot| {
            self.table
                .face(slot.face)
                .is_some_and(|f| f.protocol() == Protocol::Tcp && f.fd() == slot.fd)
        });

        let mut skipped = 0usize;
        for face in self.table.faces().filter(|f| f.protocol() == Protocol::Tcp) {
            if set.contains(face.id()) {
                continue;
            }
            if set.slots.len() >= set.capacity {
                skipped += 1;
                continue;
            }
            set.slots.push(PollSlot {
                face: face.id(),
                fd: face.fd(),
            });
        }
        if skipped > 0 {
            tracing::warn!(skipped, capacity = set.capacity, "tcp poll set full");
        }
        set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeType;
    use std::net::TcpStream;

    fn tcp_router() -> (FaceManager, std::net::SocketAddr) {
        let mut faces = FaceManager::init(NodeType::Router);
        let id = faces.listen_create(crate::core::ListenRole::TcpV4, 0).unwrap();
        let port = faces.get_listener(id).unwrap().local_addr().unwrap().port();
        (faces, ([127, 0, 0, 1], port).into())
    }

    fn accept_until(faces: &mut FaceManager, want: usize) -> usize {
        let mut total = 0;
        for _ in 0..200 {
            total += faces.accept_pending().unwrap();
            if total >= want {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        total
    }

    #[test]
    fn test_accept_nothing_pending() {
        let (mut faces, _) = tcp_router();
        assert_eq!(faces.accept_pending().unwrap(), 0);
    }

    #[test]
    fn test_accepted_faces_are_dynamic_tcp() {
        let (mut faces, addr) = tcp_router();
        let _a = TcpStream::connect(addr).unwrap();
        let _b = TcpStream::connect(addr).unwrap();

        assert_eq!(accept_until(&mut faces, 2), 2);
        for raw in [16, 17] {
            let id = FaceId::new(raw);
            assert!(faces.check_active(id));
            assert_eq!(faces.type_of(id), Protocol::Tcp);
            assert!(!faces.is_local(id));
        }
    }

    #[test]
    fn test_poll_set_tracks_tcp_faces() {
        let (mut faces, addr) = tcp_router();
        let _a = TcpStream::connect(addr).unwrap();
        let _b = TcpStream::connect(addr).unwrap();
        accept_until(&mut faces, 2);

        let mut set = TcpPollSet::new(1);
        assert_eq!(faces.refresh_tcp_poll_set(&mut set), 1);

        let mut set = TcpPollSet::new(8);
        assert_eq!(faces.refresh_tcp_poll_set(&mut set), 2);

        faces.close(FaceId::new(16)).unwrap();
        assert_eq!(faces.refresh_tcp_poll_set(&mut set), 1);
        assert!(!set.contains(FaceId::new(16)));
    }
}
