//! Frame I/O.
//!
//! A frame is `header || payload`, sent in one piece: one datagram on UDP
//! faces, one contiguous byte run on stream faces. The header bytes are
//! opaque here.

use super::manager::FaceManager;
use super::slot::FaceSlot;
use crate::core::constants::MAX_FRAME_LEN;
use crate::core::{FaceError, FaceId, FaceResult, is_descriptor_exhaustion, is_transient};

fn frame(header: &[u8], payload: &[u8]) -> FaceResult<Vec<u8>> {
    let len = header.len() + payload.len();
    if len > MAX_FRAME_LEN {
        return Err(FaceError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

impl FaceManager {
    /// Send bytes and ignore the outcome.
    ///
    /// Used for notifications whose loss is acceptable, such as the close
    /// notice to a departing application.
    pub fn send_forced(&mut self, id: FaceId, bytes: &[u8]) {
        let result = self
            .table
            .face_checked(id)
            .and_then(|face| face.send_frame(bytes));
        if let Err(e) = result {
            tracing::trace!(face = %id, error = %e, "forced send dropped");
        }
    }

    /// Send one content object as `header || payload`.
    ///
    /// On success the face's sequence counter advances by one and `chunk`
    /// is recorded. [`FaceError::WouldBlock`] leaves the face unchanged.
    pub fn send_object(
        &mut self,
        id: FaceId,
        header: &[u8],
        payload: &[u8],
        chunk: u32,
    ) -> FaceResult<()> {
        let frame = frame(header, payload)?;
        let face = self.table.face_checked(id)?;
        face.send_frame(&frame)?;
        face.count_object(chunk);
        tracing::trace!(face = %id, chunk, len = frame.len(), seqnum = face.seqnum(), "object sent");
        Ok(())
    }

    /// Send a content object only if `id` is a local face.
    ///
    /// Non-local faces are skipped without error. The caller's header
    /// convention for local delivery is an empty header.
    pub fn send_object_if_local(&mut self, id: FaceId, payload: &[u8], chunk: u32) -> FaceResult<()> {
        if !self.is_local(id) {
            return Ok(());
        }
        self.send_object(id, &[], payload, chunk)
    }

    /// Send an API message as `api_header || payload` to a local face.
    ///
    /// Non-local faces are skipped. The content-object counter is untouched.
    pub fn send_api_message_if_local(
        &mut self,
        id: FaceId,
        api_header: &[u8],
        payload: &[u8],
    ) -> FaceResult<()> {
        if !self.is_local(id) {
            return Ok(());
        }
        let frame = frame(api_header, payload)?;
        self.table.face_checked(id)?.send_frame(&frame)
    }

    /// Push queued stream bytes to the kernel. Returns the bytes still queued.
    pub fn flush_pending(&mut self, id: FaceId) -> FaceResult<usize> {
        self.table.face_checked(id)?.flush()
    }

    /// Read once from a face into its receive buffer.
    ///
    /// Returns the bytes read, or `None` when nothing was available.
    /// [`FaceError::PeerClosed`] and [`FaceError::BufferFull`] are fatal to
    /// the face.
    pub fn receive(&mut self, id: FaceId) -> FaceResult<Option<usize>> {
        self.table.face_checked(id)?.fill()
    }

    /// Bytes received on a face and not yet consumed.
    pub fn buffered(&self, id: FaceId) -> &[u8] {
        self.table.face(id).map_or(&[][..], |face| face.rx().filled())
    }

    /// Drop the first `n` received bytes of a face.
    pub fn consume(&mut self, id: FaceId, n: usize) -> FaceResult<()> {
        self.table.face_checked(id)?.rx_mut().consume(n);
        Ok(())
    }

    /// Receive one datagram on a UDP or NDN listener.
    ///
    /// The sender is resolved to its face, which is created on first
    /// contact, and the datagram is appended to that face's buffer. Returns
    /// the receiving face, or `None` when nothing was pending or the
    /// datagram was dropped.
    pub fn receive_datagram(&mut self, listener_id: FaceId) -> FaceResult<Option<FaceId>> {
        let (len, src, protocol) = match self.table.slot(listener_id) {
            Some(FaceSlot::Listening(listener)) if !listener.accepts_connections() => {
                let protocol = listener.protocol();
                match listener.recv_from(&mut self.scratch) {
                    Ok((len, src)) => (len, src, protocol),
                    Err(e) if is_transient(&e) => return Ok(None),
                    Err(e) if is_descriptor_exhaustion(&e) => {
                        return Err(FaceError::ResourceExhausted(e));
                    }
                    Err(source) => {
                        return Err(FaceError::Transport {
                            face: listener_id,
                            source,
                        });
                    }
                }
            }
            Some(FaceSlot::Listening(_)) | Some(FaceSlot::Local(_)) | Some(FaceSlot::Peer(_)) => {
                return Err(FaceError::NotConnected(listener_id));
            }
            Some(FaceSlot::Unallocated) => return Err(FaceError::Inactive(listener_id)),
            None => return Err(FaceError::UnknownFace(listener_id)),
        };

        let id = self.resolve_peer(src, protocol)?;
        let data = &self.scratch[..len];
        let face = self.table.face_checked(id)?;
        if !face.rx_mut().append(data) {
            tracing::warn!(face = %id, len, "receive buffer full, datagram dropped");
            return Ok(None);
        }
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeType, Protocol};
    use std::net::UdpSocket;

    #[test]
    fn test_frame_limit() {
        let header = [0u8; 8];
        let payload = vec![0u8; MAX_FRAME_LEN - 8];
        assert_eq!(frame(&header, &payload).unwrap().len(), MAX_FRAME_LEN);

        let payload = vec![0u8; MAX_FRAME_LEN];
        assert!(matches!(
            frame(&header, &payload),
            Err(FaceError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_udp_send_counts_objects() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut faces = FaceManager::init(NodeType::Router);
        let id = faces
            .resolve_peer(peer.local_addr().unwrap(), Protocol::Udp)
            .unwrap();

        faces.send_object(id, b"H", b"payload", 7).unwrap();
        faces.send_object(id, b"H", b"payload", 8).unwrap();
        assert_eq!(faces.get_seqnum(id), Some(2));
        assert_eq!(faces.get_face(id).unwrap().last_chunk(), Some(8));

        let mut buf = [0u8; 32];
        let n = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hpayload");
    }

    #[test]
    fn test_send_to_inactive_face() {
        let mut faces = FaceManager::init(NodeType::Router);
        let err = faces.send_object(FaceId::new(20), b"", b"x", 0).unwrap_err();
        assert!(matches!(err, FaceError::Inactive(_)));
        faces.send_forced(FaceId::new(20), b"x");
    }

    #[test]
    fn test_if_local_skips_network_face() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_nonblocking(true).unwrap();
        let mut faces = FaceManager::init(NodeType::Router);
        let id = faces
            .resolve_peer(peer.local_addr().unwrap(), Protocol::Udp)
            .unwrap();

        faces.send_object_if_local(id, b"payload", 1).unwrap();
        faces.send_api_message_if_local(id, b"api", b"payload").unwrap();
        assert_eq!(faces.get_seqnum(id), Some(0));

        let mut buf = [0u8; 32];
        assert!(peer.recv(&mut buf).is_err());
    }

    #[test]
    fn test_datagram_listener_attributes_sender() {
        let mut faces = FaceManager::init(NodeType::Router);
        let listener = faces.listen_create(crate::core::ListenRole::UdpV4, 0).unwrap();
        let port = faces.get_listener(listener).unwrap().local_addr().unwrap().port();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"interest", ("127.0.0.1", port)).unwrap();

        let mut got = None;
        for _ in 0..200 {
            got = faces.receive_datagram(listener).unwrap();
            if got.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let id = got.unwrap();
        assert_eq!(faces.buffered(id), b"interest");
        assert_eq!(faces.type_of(id), Protocol::Udp);

        faces.consume(id, 3).unwrap();
        assert_eq!(faces.buffered(id), b"erest");
    }

    #[test]
    fn test_udp_face_keeps_only_its_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
        let mut faces = FaceManager::init(NodeType::Router);
        let id = faces
            .resolve_peer(peer.local_addr().unwrap(), Protocol::Udp)
            .unwrap();

        faces.send_object(id, b"H", b"interest", 0).unwrap();
        let mut buf = [0u8; 32];
        let (_, face_addr) = peer.recv_from(&mut buf).unwrap();

        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        stranger.send_to(b"spoofed", face_addr).unwrap();
        peer.send_to(b"content", face_addr).unwrap();

        for _ in 0..200 {
            if !faces.buffered(id).is_empty() {
                break;
            }
            faces.receive(id).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(faces.buffered(id), b"content");
    }
}
