//! Peer resolution and reverse lookup.
//!
//! Outbound faces are deduplicated on (peer address, protocol): resolving the
//! same destination twice returns the same Face-ID and opens nothing.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::os::fd::RawFd;

use super::manager::FaceManager;
use super::slot::{Face, Transport};
use super::socket;
use crate::core::constants::DEFAULT_PORT;
use crate::core::{FaceError, FaceId, FaceResult, Protocol, is_descriptor_exhaustion};

/// Keyword selecting the local endpoint.
const LOCAL_KEYWORD: &str = "local";

/// Destination split into host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Host name or address literal, without brackets.
    pub host: String,
    /// Port, the default port when the destination names none.
    pub port: u16,
}

/// Split a destination string.
///
/// Accepted forms: `host`, `host:port`, `1.2.3.4`, `1.2.3.4:port`, `::1`,
/// `[::1]:port`. An unbracketed string with several colons must be an IPv6
/// literal.
pub fn parse_destination(dest: &str) -> FaceResult<Destination> {
    let dest = dest.trim();
    let invalid = || FaceError::InvalidDestination(dest.to_string());
    if dest.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = dest.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        host.parse::<std::net::Ipv6Addr>().map_err(|_| invalid())?;
        let port = match tail {
            "" => DEFAULT_PORT,
            _ => parse_port(tail.strip_prefix(':').ok_or_else(invalid)?).ok_or_else(invalid)?,
        };
        return Ok(Destination {
            host: host.to_string(),
            port,
        });
    }

    if dest.parse::<IpAddr>().is_ok() {
        return Ok(Destination {
            host: dest.to_string(),
            port: DEFAULT_PORT,
        });
    }

    match dest.matches(':').count() {
        0 => Ok(Destination {
            host: dest.to_string(),
            port: DEFAULT_PORT,
        }),
        1 => {
            let (host, port) = dest.split_once(':').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok(Destination {
                host: host.to_string(),
                port: parse_port(port).ok_or_else(invalid)?,
            })
        }
        _ => Err(invalid()),
    }
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse().ok().filter(|&p| p != 0)
}

enum Target {
    Local,
    Remote(SocketAddr, Protocol),
}

fn parse_target(dest: &str, keyword: &str) -> FaceResult<Target> {
    if keyword.eq_ignore_ascii_case(LOCAL_KEYWORD) {
        return Ok(Target::Local);
    }
    let protocol =
        Protocol::from_keyword(keyword).ok_or_else(|| FaceError::UnknownProtocol(keyword.to_string()))?;
    let parsed = parse_destination(dest)?;

    // Literals never touch the resolver.
    let addr = match parsed.host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, parsed.port),
        Err(_) => (parsed.host.as_str(), parsed.port)
            .to_socket_addrs()
            .map_err(|_| FaceError::NoAddress(dest.to_string()))?
            .next()
            .ok_or_else(|| FaceError::NoAddress(dest.to_string()))?,
    };
    Ok(Target::Remote(addr, protocol))
}

impl FaceManager {
    /// Face of a network peer, opening one if none exists.
    ///
    /// UDP and NDN faces get their own ephemeral-port socket that sends to
    /// `addr`; TCP faces start a non-blocking connect.
    pub fn resolve_peer(&mut self, addr: SocketAddr, protocol: Protocol) -> FaceResult<FaceId> {
        if let Some(id) = self.table.lookup_peer(&addr, protocol) {
            return Ok(id);
        }
        if !self.table.has_free_id() {
            return Err(FaceError::IdSpaceExhausted);
        }

        let open_error = |e: std::io::Error| {
            if is_descriptor_exhaustion(&e) {
                FaceError::ResourceExhausted(e)
            } else {
                FaceError::Io(e)
            }
        };
        let transport = match protocol {
            Protocol::Udp | Protocol::Ndn => {
                Transport::Udp(socket::open_udp(addr).map_err(open_error)?)
            }
            Protocol::Tcp => Transport::Tcp(socket::connect_tcp(addr).map_err(open_error)?),
            Protocol::Local | Protocol::Invalid => {
                return Err(FaceError::UnsupportedProtocol(protocol));
            }
        };

        let id = self
            .table
            .insert_dynamic(|id| Face::new(id, protocol, transport, Some(addr)))?;
        tracing::debug!(face = %id, peer = %addr, %protocol, "peer face created");
        Ok(id)
    }

    /// Face for a destination string and protocol keyword.
    ///
    /// The `local` keyword names the local endpoint. Hostnames are resolved
    /// through the system resolver, which may block.
    pub fn resolve_from_string(&mut self, dest: &str, keyword: &str) -> FaceResult<FaceId> {
        match parse_target(dest, keyword)? {
            Target::Local => Ok(FaceId::LOCAL),
            Target::Remote(addr, protocol) => self.resolve_peer(addr, protocol),
        }
    }

    /// Existing face for a destination, never creating one.
    pub fn search_only(&self, dest: &str, keyword: &str) -> FaceResult<Option<FaceId>> {
        Ok(match parse_target(dest, keyword)? {
            Target::Local => self.check_active(FaceId::LOCAL).then_some(FaceId::LOCAL),
            Target::Remote(addr, protocol) => self.table.lookup_peer(&addr, protocol),
        })
    }

    /// Face owning a handle.
    ///
    /// Every installed handle is indexed, so a miss means no face owns it.
    pub fn identify_by_handle(&self, fd: RawFd) -> FaceResult<FaceId> {
        self.table.lookup_handle(fd).ok_or(FaceError::UnknownHandle(fd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeType;

    fn dest(host: &str, port: u16) -> Destination {
        Destination {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_parse_destination_forms() {
        assert_eq!(parse_destination("example.net").unwrap(), dest("example.net", 9896));
        assert_eq!(parse_destination("example.net:80").unwrap(), dest("example.net", 80));
        assert_eq!(parse_destination("10.0.0.1").unwrap(), dest("10.0.0.1", 9896));
        assert_eq!(parse_destination("10.0.0.1:7000").unwrap(), dest("10.0.0.1", 7000));
        assert_eq!(parse_destination("::1").unwrap(), dest("::1", 9896));
        assert_eq!(parse_destination("[::1]:7000").unwrap(), dest("::1", 7000));
        assert_eq!(parse_destination("[fe80::1]").unwrap(), dest("fe80::1", 9896));
    }

    #[test]
    fn test_parse_destination_rejects() {
        for bad in ["", ":80", "host:", "host:port", "host:70000", "[::1", "[::1]x", "a:b:c", "[nothost]:1"] {
            let err = parse_destination(bad).unwrap_err();
            assert!(err.is_malformed_input(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_unknown_keyword() {
        let mut faces = FaceManager::init(NodeType::Router);
        let err = faces.resolve_from_string("127.0.0.1", "sctp").unwrap_err();
        assert!(matches!(err, FaceError::UnknownProtocol(_)));
        assert!(faces.table().is_empty());
    }

    #[test]
    fn test_local_keyword() {
        let mut faces = FaceManager::init(NodeType::Router);
        assert_eq!(faces.resolve_from_string("ignored", "local").unwrap(), FaceId::LOCAL);
        assert_eq!(faces.search_only("ignored", "LOCAL").unwrap(), None);
    }

    #[test]
    fn test_resolve_udp_dedupes() {
        let mut faces = FaceManager::init(NodeType::Router);
        let a = faces.resolve_from_string("127.0.0.1:9", "udp").unwrap();
        let b = faces.resolve_from_string("127.0.0.1:9", "UDP").unwrap();
        assert_eq!(a, b);
        assert_eq!(faces.table().len(), 1);
        assert_eq!(faces.search_only("127.0.0.1:9", "udp").unwrap(), Some(a));

        // Same address, other protocol: distinct face.
        assert_eq!(faces.search_only("127.0.0.1:9", "tcp").unwrap(), None);
    }

    #[test]
    fn test_identify_by_handle() {
        let mut faces = FaceManager::init(NodeType::Router);
        let id = faces.resolve_from_string("127.0.0.1:9", "udp").unwrap();
        let fd = faces.get_handle(id).unwrap();
        assert_eq!(faces.identify_by_handle(fd).unwrap(), id);
        assert_eq!(faces.protocol_of_handle(fd), Some(Protocol::Udp));
        assert!(matches!(
            faces.identify_by_handle(-1),
            Err(FaceError::UnknownHandle(-1))
        ));
    }

    #[test]
    fn test_local_protocol_not_resolvable() {
        let mut faces = FaceManager::init(NodeType::Router);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(matches!(
            faces.resolve_peer(addr, Protocol::Local),
            Err(FaceError::UnsupportedProtocol(Protocol::Local))
        ));
    }
}
