//! End-to-end behavior of the face manager over real sockets.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::Path;
use std::time::Duration;

use ccn_face::core::constants::FACE_CLOSE_NOTIFICATION;
use ccn_face::face::{LocalKind, NamespacePolicy};
use ccn_face::{FaceConfig, FaceError, FaceId, FaceManager, NodeType, Protocol};
use tempfile::TempDir;

fn manager_with_socket(node_type: NodeType, path: &Path) -> FaceManager {
    FaceManager::with_config(FaceConfig {
        node_type,
        local_namespace: NamespacePolicy::Filesystem,
        local_socket_path: Some(path.to_path_buf()),
        ..FaceConfig::default()
    })
}

/// Local stream endpoint plus one connected application.
fn local_app(faces: &mut FaceManager, path: &Path) -> (FaceId, UnixStream) {
    faces.local_face_create(LocalKind::Stream).unwrap();
    let app = UnixStream::connect(path).unwrap();
    app.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    for _ in 0..200 {
        if faces.accept_pending().unwrap() == 1 {
            return (FaceId::new(16), app);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("local connection not accepted");
}

#[test]
fn test_resolve_is_idempotent_per_protocol() {
    let mut faces = FaceManager::init(NodeType::Router);
    let udp = faces.resolve_from_string("127.0.0.1:9896", "udp").unwrap();
    let again = faces.resolve_from_string("127.0.0.1:9896", "udp").unwrap();
    assert_eq!(udp, again);

    let tcp_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let tcp_dest = tcp_listener.local_addr().unwrap().to_string();
    let tcp = faces.resolve_from_string(&tcp_dest, "tcp").unwrap();
    assert_ne!(udp, tcp);
    assert_eq!(faces.resolve_from_string(&tcp_dest, "tcp").unwrap(), tcp);
    assert_eq!(faces.table().len(), 2);
}

#[test]
fn test_search_only_never_creates() {
    let mut faces = FaceManager::init(NodeType::Router);
    assert_eq!(faces.search_only("127.0.0.1:9896", "udp").unwrap(), None);
    assert!(faces.table().is_empty());

    let id = faces.resolve_from_string("127.0.0.1:9896", "udp").unwrap();
    assert_eq!(faces.search_only("127.0.0.1:9896", "udp").unwrap(), Some(id));
}

#[test]
fn test_accepted_face_active_until_closed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    let (id, _app) = local_app(&mut faces, &path);

    assert!(faces.check_active(id));
    assert!(faces.is_local(id));
    assert_eq!(faces.type_of(id), Protocol::Local);
    let fd = faces.get_handle(id).unwrap();
    assert_eq!(faces.identify_by_handle(fd).unwrap(), id);

    faces.close(id).unwrap();
    assert!(!faces.check_active(id));
    assert!(matches!(faces.identify_by_handle(fd), Err(FaceError::UnknownHandle(_))));
    assert!(matches!(faces.close(id), Err(FaceError::Inactive(_))));
}

#[test]
fn test_close_notifies_local_application() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    let (id, mut app) = local_app(&mut faces, &path);

    faces.close(id).unwrap();

    let mut received = Vec::new();
    app.read_to_end(&mut received).unwrap();
    assert_eq!(received, FACE_CLOSE_NOTIFICATION);
}

#[test]
fn test_local_stream_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    let (id, mut app) = local_app(&mut faces, &path);

    assert_eq!(faces.get_seqnum(id), Some(0));
    faces.send_object(id, b"H1", b"first", 0).unwrap();
    assert_eq!(faces.get_seqnum(id), Some(1));
    faces.send_object(id, b"H2", b"second", 1).unwrap();
    assert_eq!(faces.get_seqnum(id), Some(2));

    let mut buf = vec![0u8; b"H1firstH2second".len()];
    app.read_exact(&mut buf).unwrap();
    assert_eq!(buf, b"H1firstH2second");
}

#[test]
fn test_api_message_leaves_seqnum() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    let (id, mut app) = local_app(&mut faces, &path);

    faces.send_api_message_if_local(id, b"API", b"status").unwrap();
    faces.send_object_if_local(id, b"data", 3).unwrap();
    assert_eq!(faces.get_seqnum(id), Some(1));

    let mut buf = vec![0u8; b"APIstatusdata".len()];
    app.read_exact(&mut buf).unwrap();
    assert_eq!(buf, b"APIstatusdata");
}

#[test]
fn test_seqnum_is_per_face() {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut faces = FaceManager::init(NodeType::Router);
    let fa = faces.resolve_peer(a.local_addr().unwrap(), Protocol::Udp).unwrap();
    let fb = faces.resolve_peer(b.local_addr().unwrap(), Protocol::Udp).unwrap();

    for chunk in 0..3 {
        faces.send_object(fa, b"", b"x", chunk).unwrap();
    }
    faces.send_object(fb, b"", b"y", 0).unwrap();

    assert_eq!(faces.get_seqnum(fa), Some(3));
    assert_eq!(faces.get_seqnum(fb), Some(1));
}

#[test]
fn test_if_local_on_network_face_sends_nothing() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    let mut faces = FaceManager::init(NodeType::Router);
    let id = faces.resolve_peer(peer.local_addr().unwrap(), Protocol::Udp).unwrap();

    faces.send_object_if_local(id, b"payload", 0).unwrap();
    assert_eq!(faces.get_seqnum(id), Some(0));

    let mut buf = [0u8; 16];
    assert!(peer.recv(&mut buf).is_err());
}

#[test]
fn test_bind_conflict_leaves_table_unchanged() {
    let taken = TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut faces = FaceManager::init(NodeType::Router);
    faces.resolve_from_string("127.0.0.1:9896", "udp").unwrap();
    let before = faces.table().len();

    let err = faces.tcp_listen_create(port).unwrap_err();
    assert!(matches!(err, FaceError::Listen { port: p, .. } if p == port));
    assert_eq!(faces.table().len(), before);
    assert!(!faces.check_active(FaceId::new(6)));
}

#[test]
fn test_rtt_sample_clamped() {
    let mut faces = FaceManager::init(NodeType::Router);
    let id = faces.resolve_from_string("127.0.0.1:9896", "udp").unwrap();

    let stored = faces.record_rtt(id, Duration::from_micros(2_000_000)).unwrap();
    assert_eq!(stored.rtt_us, 1_000_000);
    assert_eq!(faces.rtt_of(id).unwrap().rtt_us, 1_000_000);
    assert_eq!(faces.neighbor_rtts().len(), 1);
}

#[test]
fn test_consumer_keeps_local_endpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Consumer, &path);

    faces.open_configured().unwrap();
    assert!(faces.check_active(FaceId::LOCAL));
    assert!(!faces.check_active(FaceId::new(4)));
    assert_eq!(faces.search_only("", "local").unwrap(), Some(FaceId::LOCAL));

    faces.close_all();
    assert!(!path.exists());
}

#[test]
fn test_local_datagram_replies_to_last_sender() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    faces.local_face_create(LocalKind::Datagram).unwrap();
    assert!(faces.is_local(FaceId::LOCAL));

    let app = UnixDatagram::bind(dir.path().join("app.sock")).unwrap();
    app.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    app.send_to(b"interest", &path).unwrap();

    let mut got = None;
    for _ in 0..200 {
        got = faces.receive(FaceId::LOCAL).unwrap();
        if got.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(got, Some(8));
    assert_eq!(faces.buffered(FaceId::LOCAL), b"interest");

    faces.send_object_if_local(FaceId::LOCAL, b"content", 0).unwrap();
    let mut buf = [0u8; 32];
    let n = app.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"content");

    faces.close(FaceId::LOCAL).unwrap();
    let n = app.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], FACE_CLOSE_NOTIFICATION);
    assert!(!path.exists());
}

#[test]
fn test_udp_peer_port_closed_is_not_fatal() {
    let gone = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = gone.local_addr().unwrap();
    drop(gone);

    let mut faces = FaceManager::init(NodeType::Router);
    let id = faces.resolve_peer(addr, Protocol::Udp).unwrap();
    faces.send_object(id, b"H", b"first", 0).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    faces.send_object(id, b"H", b"second", 1).unwrap();
    assert_eq!(faces.receive(id).unwrap(), None);

    assert!(faces.check_active(id));
    assert_eq!(faces.get_seqnum(id), Some(2));
}

#[test]
fn test_stream_backlog_flushes_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ccnd.sock");
    let mut faces = manager_with_socket(NodeType::Router, &path);
    let (id, mut app) = local_app(&mut faces, &path);

    let block = 60_000;
    let mut accepted = Vec::new();
    for chunk in 0..200u32 {
        let payload = vec![chunk as u8; block];
        let before = faces.get_seqnum(id);
        match faces.send_object(id, b"", &payload, chunk) {
            Ok(()) => accepted.push(chunk),
            Err(FaceError::WouldBlock) => assert_eq!(faces.get_seqnum(id), before),
            Err(e) => panic!("unexpected send error: {e}"),
        }
    }
    assert!(accepted.len() < 200);
    assert_eq!(faces.get_seqnum(id), Some(accepted.len() as u32));
    assert!(faces.get_face(id).unwrap().pending_len() > 0);

    let expected = accepted.len() * block;
    let reader = std::thread::spawn(move || {
        let mut buf = vec![0u8; expected];
        app.read_exact(&mut buf).unwrap();
        (buf, app)
    });

    let mut left = usize::MAX;
    for _ in 0..400 {
        left = faces.flush_pending(id).unwrap();
        if left == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(left, 0);

    let (received, mut app) = reader.join().unwrap();
    for (frame, chunk) in received.chunks(block).zip(&accepted) {
        assert!(frame.iter().all(|&b| b == *chunk as u8));
    }

    faces.send_object(id, b"", b"tail", 999).unwrap();
    let mut tail = [0u8; 4];
    app.read_exact(&mut tail).unwrap();
    assert_eq!(&tail, b"tail");
}
