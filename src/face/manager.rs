//! The face manager.
//!
//! [`FaceManager`] owns the face table and every open transport handle. It is
//! a plain owned value driven from one thread: the event loop polls the
//! handles from [`FaceManager::snapshot_for_polling`], then calls the
//! mutating operations between poll iterations.

use std::os::fd::{BorrowedFd, RawFd};

use super::local::LocalProfile;
use super::slot::{Face, FaceSlot, Listener, SocketPathGuard};
use super::table::FaceTable;
use crate::config::FaceConfig;
use crate::core::constants::MAX_FRAME_LEN;
use crate::core::{FaceId, FaceResult, ListenRole, NodeType, Protocol};

/// What readiness on a polled handle means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollRole {
    /// Connection-oriented listener with pending connections.
    Accept,
    /// Datagram listener with pending datagrams from any peer.
    Datagram(Protocol),
    /// Frame-carrying face with bytes to read.
    Face(Protocol),
}

/// One handle to poll.
#[derive(Debug, Clone, Copy)]
pub struct PollEntry<'a> {
    /// Owning face.
    pub face: FaceId,
    /// Borrowed handle.
    pub fd: BorrowedFd<'a>,
    /// Meaning of readiness.
    pub role: PollRole,
}

/// Registry of all faces of a node.
#[derive(Debug)]
pub struct FaceManager {
    pub(crate) table: FaceTable,
    node_type: NodeType,
    config: FaceConfig,
    local_profile: LocalProfile,
    /// Socket file of a datagram local endpoint, removed on close.
    pub(super) local_path_guard: Option<SocketPathGuard>,
    /// Receive area for datagram listeners.
    pub(super) scratch: Box<[u8]>,
}

impl FaceManager {
    /// Create a manager for a node role with default settings.
    pub fn init(node_type: NodeType) -> Self {
        Self::with_config(FaceConfig {
            node_type,
            ..FaceConfig::default()
        })
    }

    /// Create a manager from a configuration.
    ///
    /// Every slot starts unallocated; the local naming profile is resolved
    /// here, once.
    pub fn with_config(config: FaceConfig) -> Self {
        let local_profile = config.local_profile();
        tracing::debug!(
            node_type = %config.node_type,
            capacity = config.max_faces,
            local = %local_profile,
            "face manager initialized"
        );
        Self {
            table: FaceTable::new(config.max_faces),
            node_type: config.node_type,
            config,
            local_profile,
            local_path_guard: None,
            scratch: vec![0u8; MAX_FRAME_LEN].into_boxed_slice(),
        }
    }

    /// Open the local endpoint and every listener enabled in the
    /// configuration.
    ///
    /// The local endpoint is mandatory. Listener failures are logged and
    /// skipped so a node without network access still serves applications.
    pub fn open_configured(&mut self) -> FaceResult<()> {
        self.local_face_create(self.config.local_kind)?;
        if !self.node_type.may_listen() {
            return Ok(());
        }

        let wanted = [
            (self.config.listen_udp, Protocol::Udp, self.config.port),
            (self.config.listen_tcp, Protocol::Tcp, self.config.port),
            (self.config.listen_ndn, Protocol::Ndn, self.config.ndn_port),
        ];
        for (enabled, protocol, port) in wanted {
            if !enabled {
                continue;
            }
            let result = match protocol {
                Protocol::Udp => self.udp_listen_create(port),
                Protocol::Tcp => self.tcp_listen_create(port),
                _ => self.ndn_listen_create(port),
            };
            if let Err(e) = result {
                tracing::warn!(%protocol, port, error = %e, "listener not available");
            }
        }
        Ok(())
    }

    /// Node role.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Active configuration.
    pub fn config(&self) -> &FaceConfig {
        &self.config
    }

    /// Naming of the local endpoint.
    pub fn local_profile(&self) -> &LocalProfile {
        &self.local_profile
    }

    /// Read-only view of the face table.
    pub fn table(&self) -> &FaceTable {
        &self.table
    }

    /// Frame-carrying face of an identifier.
    pub fn get_face(&self, id: FaceId) -> Option<&Face> {
        self.table.face(id)
    }

    /// Open listener of a reserved identifier.
    pub fn get_listener(&self, id: FaceId) -> Option<&Listener> {
        match self.table.slot(id)? {
            FaceSlot::Listening(listener) => Some(listener),
            _ => None,
        }
    }

    /// Transport handle of an identifier.
    pub fn get_handle(&self, id: FaceId) -> Option<RawFd> {
        self.table.slot(id)?.fd()
    }

    /// Content-object sequence counter of a face.
    pub fn get_seqnum(&self, id: FaceId) -> Option<u32> {
        self.table.face(id).map(Face::seqnum)
    }

    /// Whether an identifier has an open handle.
    pub fn check_active(&self, id: FaceId) -> bool {
        self.table.slot(id).is_some_and(FaceSlot::is_active)
    }

    /// Whether an identifier belongs to the local application side.
    pub fn is_local(&self, id: FaceId) -> bool {
        self.table.slot(id).is_some_and(FaceSlot::is_local)
    }

    /// Protocol of an identifier, [`Protocol::Invalid`] when not active.
    pub fn type_of(&self, id: FaceId) -> Protocol {
        self.table
            .slot(id)
            .map_or(Protocol::Invalid, FaceSlot::protocol)
    }

    /// Protocol of the face owning a handle.
    pub fn protocol_of_handle(&self, fd: RawFd) -> Option<Protocol> {
        let id = self.table.lookup_handle(fd)?;
        Some(self.type_of(id))
    }

    /// Whether a listener role is open.
    pub fn is_listening(&self, role: ListenRole) -> bool {
        self.get_listener(role.face_id()).is_some()
    }

    /// Handles to poll, in identifier order.
    ///
    /// The borrow ends before any mutating operation can run, so the snapshot
    /// never outlives the handles it names.
    pub fn snapshot_for_polling(&self) -> impl Iterator<Item = PollEntry<'_>> {
        self.table.iter().filter_map(|(face, slot)| {
            let (fd, role) = match slot {
                FaceSlot::Unallocated => return None,
                FaceSlot::Listening(l) if l.accepts_connections() => (l.handle(), PollRole::Accept),
                FaceSlot::Listening(l) => (l.handle(), PollRole::Datagram(l.protocol())),
                FaceSlot::Local(f) | FaceSlot::Peer(f) => (f.handle(), PollRole::Face(f.protocol())),
            };
            Some(PollEntry { face, fd, role })
        })
    }
}
