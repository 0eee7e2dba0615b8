//! Identifier, protocol and role types shared by every face component.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Deserialize;

use super::constants::*;

/// Face identifier.
///
/// Values below [`RESERVED_FACE_IDS`] name structural roles (local endpoint,
/// listeners); values at or above it are dynamically assigned peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaceId(u16);

impl FaceId {
    /// Local inter-process endpoint.
    pub const LOCAL: Self = Self(FACEID_LOCAL);

    /// Create a Face-ID from its raw value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Get the raw numeric value.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Index into the face table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this identifier belongs to a fixed structural role.
    pub const fn is_reserved(self) -> bool {
        self.0 < RESERVED_FACE_IDS
    }

    /// Whether this identifier is handed out to peers and recycled on close.
    pub const fn is_dynamic(self) -> bool {
        !self.is_reserved()
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face-{}", self.0)
    }
}

impl From<FaceId> for u16 {
    fn from(id: FaceId) -> u16 {
        id.0
    }
}

/// Transport protocol of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Placeholder for unallocated slots and unknown handles.
    #[default]
    Invalid,
    /// Plain UDP.
    Udp,
    /// TCP.
    Tcp,
    /// UDP carrying NDN-compatible packets.
    Ndn,
    /// Local inter-process channel.
    Local,
}

impl Protocol {
    /// Parse a protocol keyword as accepted by the string resolution API.
    ///
    /// Only `udp`, `tcp` and `local` are accepted there; NDN faces are created
    /// by address.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        if keyword.eq_ignore_ascii_case("udp") {
            Some(Self::Udp)
        } else if keyword.eq_ignore_ascii_case("tcp") {
            Some(Self::Tcp)
        } else if keyword.eq_ignore_ascii_case("local") {
            Some(Self::Local)
        } else {
            None
        }
    }

    /// Whether faces of this protocol are accepted from a listener.
    pub fn is_connection_oriented(self) -> bool {
        matches!(self, Self::Tcp)
    }

    /// Whether faces of this protocol use UDP datagrams.
    pub fn is_datagram(self) -> bool {
        matches!(self, Self::Udp | Self::Ndn)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Ndn => "ndn",
            Self::Local => "local",
        };
        f.write_str(s)
    }
}

/// Operating role of the node. Gates which listeners may be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Full forwarder: local endpoint plus every network listener.
    #[default]
    Router,
    /// Consumer-only node: local endpoint and outbound faces, no listeners.
    Consumer,
}

impl NodeType {
    /// Whether this node may open network listeners.
    pub fn may_listen(self) -> bool {
        matches!(self, Self::Router)
    }

    /// Parse a node type name (`router` or `consumer`).
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("router") {
            Some(Self::Router)
        } else if name.eq_ignore_ascii_case("consumer") || name.eq_ignore_ascii_case("receiver") {
            Some(Self::Consumer)
        } else {
            None
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Router => f.write_str("router"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// IP family of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl IpFamily {
    /// Wildcard address of this family on the given port.
    pub fn wildcard(self, port: u16) -> SocketAddr {
        match self {
            Self::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            Self::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
        }
    }

    /// Family of a socket address.
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() { Self::V4 } else { Self::V6 }
    }
}

/// Network listener roles, each bound to a fixed reserved Face-ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenRole {
    /// UDP, IPv4.
    UdpV4,
    /// UDP, IPv6.
    UdpV6,
    /// TCP, IPv4.
    TcpV4,
    /// TCP, IPv6.
    TcpV6,
    /// NDN-compatible UDP, IPv4.
    NdnV4,
    /// NDN-compatible UDP, IPv6.
    NdnV6,
}

impl ListenRole {
    /// All listener roles, in Face-ID order.
    pub const ALL: [Self; 6] = [
        Self::UdpV4,
        Self::UdpV6,
        Self::TcpV4,
        Self::TcpV6,
        Self::NdnV4,
        Self::NdnV6,
    ];

    /// The reserved Face-ID of this role.
    pub fn face_id(self) -> FaceId {
        FaceId::new(match self {
            Self::UdpV4 => FACEID_LISTEN_UDP_V4,
            Self::UdpV6 => FACEID_LISTEN_UDP_V6,
            Self::TcpV4 => FACEID_LISTEN_TCP_V4,
            Self::TcpV6 => FACEID_LISTEN_TCP_V6,
            Self::NdnV4 => FACEID_LISTEN_NDN_V4,
            Self::NdnV6 => FACEID_LISTEN_NDN_V6,
        })
    }

    /// The role bound to a reserved Face-ID, if any.
    pub fn for_face_id(id: FaceId) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.face_id() == id)
    }

    /// Protocol of faces created through this listener.
    pub fn protocol(self) -> Protocol {
        match self {
            Self::UdpV4 | Self::UdpV6 => Protocol::Udp,
            Self::TcpV4 | Self::TcpV6 => Protocol::Tcp,
            Self::NdnV4 | Self::NdnV6 => Protocol::Ndn,
        }
    }

    /// IP family of this role.
    pub fn family(self) -> IpFamily {
        match self {
            Self::UdpV4 | Self::TcpV4 | Self::NdnV4 => IpFamily::V4,
            Self::UdpV6 | Self::TcpV6 | Self::NdnV6 => IpFamily::V6,
        }
    }

    /// The v4 and v6 roles for a listener protocol.
    pub fn pair(protocol: Protocol) -> Option<(Self, Self)> {
        match protocol {
            Protocol::Udp => Some((Self::UdpV4, Self::UdpV6)),
            Protocol::Tcp => Some((Self::TcpV4, Self::TcpV6)),
            Protocol::Ndn => Some((Self::NdnV4, Self::NdnV6)),
            Protocol::Invalid | Protocol::Local => None,
        }
    }
}

impl fmt::Display for ListenRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family() {
            IpFamily::V4 => "v4",
            IpFamily::V6 => "v6",
        };
        write!(f, "{}-listen-{}", self.protocol(), family)
    }
}
