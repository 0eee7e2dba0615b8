//! Identifiers, constants and errors shared by every face component.

pub mod constants;
mod error;
mod types;

pub use error::{FaceError, FaceResult};
pub(crate) use error::{is_descriptor_exhaustion, is_transient};
pub use types::{FaceId, IpFamily, ListenRole, NodeType, Protocol};
