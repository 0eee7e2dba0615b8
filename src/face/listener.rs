//! Listener manager.
//!
//! Network listeners live under fixed reserved Face-IDs, one per protocol and
//! IP family. The v4 listener of a protocol is mandatory; the v6 listener is
//! best effort, since hosts without IPv6 are common.

use super::manager::FaceManager;
use super::slot::{FaceSlot, ListenSocket, Listener};
use super::socket;
use crate::core::{FaceError, FaceId, FaceResult, ListenRole, Protocol};

impl FaceManager {
    /// Create the UDP listeners on `port`. Returns the v4 listener's id.
    pub fn udp_listen_create(&mut self, port: u16) -> FaceResult<FaceId> {
        self.listen_pair(Protocol::Udp, port)
    }

    /// Create the TCP listeners on `port`. Returns the v4 listener's id.
    pub fn tcp_listen_create(&mut self, port: u16) -> FaceResult<FaceId> {
        self.listen_pair(Protocol::Tcp, port)
    }

    /// Create the NDN-compatible UDP listeners on `port`. Returns the v4
    /// listener's id.
    pub fn ndn_listen_create(&mut self, port: u16) -> FaceResult<FaceId> {
        self.listen_pair(Protocol::Ndn, port)
    }

    fn listen_pair(&mut self, protocol: Protocol, port: u16) -> FaceResult<FaceId> {
        let (v4, v6) = ListenRole::pair(protocol).ok_or(FaceError::UnsupportedProtocol(protocol))?;
        let id = self.listen_create(v4, port)?;
        if let Err(e) = self.listen_create(v6, port) {
            tracing::warn!(role = %v6, port, error = %e, "ipv6 listener unavailable");
        }
        Ok(id)
    }

    /// Create a single listener role on `port`.
    ///
    /// Idempotent: an open role is returned unchanged. On failure the table
    /// is left as it was.
    pub fn listen_create(&mut self, role: ListenRole, port: u16) -> FaceResult<FaceId> {
        let id = role.face_id();
        if !self.node_type().may_listen() {
            return Err(FaceError::NotPermitted {
                role,
                node_type: self.node_type(),
            });
        }
        if self.check_active(id) {
            return Ok(id);
        }

        let addr = role.family().wildcard(port);
        let listen_error = |source| FaceError::Listen { role, port, source };
        let socket = if role.protocol().is_connection_oriented() {
            ListenSocket::Tcp(socket::bind_tcp(addr, self.config().tcp_backlog).map_err(listen_error)?)
        } else {
            ListenSocket::Udp(socket::bind_udp(addr).map_err(listen_error)?)
        };

        let listener = Listener::new(id, role.protocol(), socket, None);
        let bound = listener.local_addr();
        self.table.install_reserved(id, FaceSlot::Listening(listener));

        tracing::info!(face = %id, %role, addr = ?bound, "listener created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeType;

    #[test]
    fn test_listen_is_idempotent() {
        let mut faces = FaceManager::init(NodeType::Router);
        let first = faces.listen_create(ListenRole::UdpV4, 0).unwrap();
        let fd = faces.get_handle(first);
        let again = faces.listen_create(ListenRole::UdpV4, 0).unwrap();

        assert_eq!(first, again);
        assert_eq!(faces.get_handle(again), fd);
        assert_eq!(faces.type_of(first), Protocol::Udp);
        assert_eq!(faces.table().len(), 1);
    }

    #[test]
    fn test_consumer_cannot_listen() {
        let mut faces = FaceManager::init(NodeType::Consumer);
        let err = faces.tcp_listen_create(0).unwrap_err();
        assert!(matches!(err, FaceError::NotPermitted { .. }));
        assert!(faces.table().is_empty());
    }

    #[test]
    fn test_listeners_use_reserved_ids() {
        let mut faces = FaceManager::init(NodeType::Router);
        assert_eq!(faces.udp_listen_create(0).unwrap(), FaceId::new(4));
        assert_eq!(faces.tcp_listen_create(0).unwrap(), FaceId::new(6));
        assert_eq!(faces.ndn_listen_create(0).unwrap(), FaceId::new(8));
        assert!(faces.is_listening(ListenRole::TcpV4));
        assert_eq!(faces.type_of(FaceId::new(8)), Protocol::Ndn);
    }
}
