//! # ccn-face
//!
//! Face manager of a content-centric networking forwarder.
//!
//! A forwarder exchanges frames with neighbors over UDP, TCP and
//! NDN-compatible UDP, and with local applications over a Unix-domain
//! socket. This crate hides those transports behind numeric Face-IDs:
//!
//! - **Registry**: one owned [`FaceManager`] holding every open handle
//! - **Listeners**: fixed reserved ids per protocol and IP family
//! - **Peers**: dynamic ids, deduplicated on (address, protocol)
//! - **Frames**: opaque `header || payload` transmission with per-face
//!   sequence counters
//! - **Teardown**: local applications are told before their face goes away
//!
//! ## Feature Flags
//!
//! - `daemon` (default): poll-driven [`daemon::EventLoop`] and the
//!   `ccn-faced` binary
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ccn_face::prelude::*;
//!
//! # fn main() -> FaceResult<()> {
//! let mut faces = FaceManager::init(NodeType::Router);
//! faces.local_face_create(LocalKind::Stream)?;
//! faces.udp_listen_create(9896)?;
//!
//! let peer = faces.resolve_from_string("192.0.2.7:9896", "udp")?;
//! faces.send_object(peer, b"HDR", b"content", 0)?;
//! assert_eq!(faces.get_seqnum(peer), Some(1));
//!
//! faces.close_all();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod config;
pub mod face;

// Event loop (feature-gated)
#[cfg(feature = "daemon")]
#[cfg_attr(docsrs, doc(cfg(feature = "daemon")))]
pub mod daemon;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigError, FaceConfig};
    pub use crate::core::*;
    pub use crate::face::{
        FaceManager, LocalKind, NamespacePolicy, PollEntry, PollRole, TcpPollSet,
    };

    #[cfg(feature = "daemon")]
    pub use crate::daemon::{EventLoop, FrameHandler, ShutdownFlag};
}

// Re-export commonly used items at crate root
pub use crate::config::FaceConfig;
pub use crate::core::{FaceError, FaceId, FaceResult, NodeType, Protocol};
pub use crate::face::FaceManager;
