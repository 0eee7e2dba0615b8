//! Face management.
//!
//! A face is one communication endpoint of the forwarder, named by a numeric
//! Face-ID. This module owns all of them:
//!
//! - **Table**: [`FaceTable`] maps Face-IDs to slots and keeps the handle and
//!   peer-address indices
//! - **Listeners**: reserved UDP/TCP/NDN listeners and the local endpoint
//! - **Acceptor**: turns pending connections into dynamic faces
//! - **Resolution**: destination strings and peer addresses to faces, with
//!   deduplication
//! - **Frame I/O**: `header || payload` transmission, receive buffers
//! - **Lifecycle**: close with local notification, index cleanup
//!
//! # Identifier layout
//!
//! ```text
//!   0        local endpoint (stream listener or datagram face)
//!   4 / 5    UDP listener v4 / v6
//!   6 / 7    TCP listener v4 / v6
//!   8 / 9    NDN listener v4 / v6
//!   16 ..    dynamic faces, lowest free first, recycled on close
//! ```

mod acceptor;
mod io;
mod lifecycle;
mod listener;
mod local;
mod manager;
mod resolve;
mod rtt;
mod slot;
mod socket;
mod table;

pub use acceptor::{PollSlot, TcpPollSet};
pub use local::{LocalKind, LocalProfile, NamespacePolicy, default_socket_path};
pub use manager::{FaceManager, PollEntry, PollRole};
pub use resolve::{Destination, parse_destination};
pub use rtt::{NeighborRtt, RttTracker, clamp_rtt_us};
pub use slot::{Face, FaceSlot, Listener, RecvBuffer};
pub use table::FaceTable;
