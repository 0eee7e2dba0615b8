//! Face manager constants.
//!
//! Reserved identifiers and wire literals are shared with local applications
//! and peers, so they MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// RESERVED FACE-IDS
// =============================================================================

/// Number of reserved Face-IDs. Identifiers at or above this are dynamic peers.
pub const RESERVED_FACE_IDS: u16 = 16;

/// Local inter-process endpoint.
pub const FACEID_LOCAL: u16 = 0;

/// UDP listener, IPv4.
pub const FACEID_LISTEN_UDP_V4: u16 = 4;

/// UDP listener, IPv6.
pub const FACEID_LISTEN_UDP_V6: u16 = 5;

/// TCP listener, IPv4.
pub const FACEID_LISTEN_TCP_V4: u16 = 6;

/// TCP listener, IPv6.
pub const FACEID_LISTEN_TCP_V6: u16 = 7;

/// NDN-compatible UDP listener, IPv4.
pub const FACEID_LISTEN_NDN_V4: u16 = 8;

/// NDN-compatible UDP listener, IPv6.
pub const FACEID_LISTEN_NDN_V6: u16 = 9;

// =============================================================================
// TABLE SIZING
// =============================================================================

/// Default number of face slots (reserved + dynamic).
pub const DEFAULT_MAX_FACES: u16 = 512;

/// Maximum length of one frame, and capacity of each face receive buffer.
pub const MAX_FRAME_LEN: usize = 65535;

/// Default listen backlog for TCP listeners.
pub const DEFAULT_TCP_BACKLOG: i32 = 16;

// =============================================================================
// PORTS
// =============================================================================

/// Default port for UDP and TCP faces.
pub const DEFAULT_PORT: u16 = 9896;

/// Default port for NDN-compatible faces.
pub const DEFAULT_NDN_PORT: u16 = 6363;

// =============================================================================
// LOCAL ENDPOINT
// =============================================================================

/// Default file name of the local socket on ordinary platforms.
pub const LOCAL_SOCKET_FILE: &str = "ccnd.sock";

/// Default abstract-namespace name (no terminating NUL, length-addressed).
pub const LOCAL_ABSTRACT_NAME: &str = "org.app.ccnd";

/// Payload sent to a local application before its face is torn down.
pub const FACE_CLOSE_NOTIFICATION: &[u8] = b"/CLOSE:Face";

// =============================================================================
// NEIGHBOR MANAGEMENT
// =============================================================================

/// Ceiling for RTT samples, in microseconds.
pub const MAX_RTT_US: u64 = 1_000_000;

/// Ceiling for RTT samples.
pub const MAX_RTT: Duration = Duration::from_micros(MAX_RTT_US);

/// Alpha for smoothed RTT (0.125 = 1/8).
pub const SRTT_ALPHA: f64 = 0.125;
