//! Error types for the face manager.
//!
//! Errors fall into four classes, each with a classification helper:
//! resource exhaustion, transient conditions, fatal transport errors and
//! malformed input. Callers close a face after a fatal error and retry on a
//! later poll cycle after a transient one.

use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

use super::types::{FaceId, ListenRole, NodeType, Protocol};

/// Face manager errors.
#[derive(Debug, Error)]
pub enum FaceError {
    /// Identifier is outside the table.
    #[error("unknown face {0}")]
    UnknownFace(FaceId),

    /// Identifier is in range but has no open transport.
    #[error("{0} is not active")]
    Inactive(FaceId),

    /// Face is a listener and cannot carry frames.
    #[error("{0} is a listener, not a connected face")]
    NotConnected(FaceId),

    /// Handle is not owned by any face.
    #[error("handle {0} is not owned by any face")]
    UnknownHandle(RawFd),

    /// No dynamic Face-ID is free.
    #[error("face identifier space exhausted")]
    IdSpaceExhausted,

    /// The process ran out of descriptors.
    #[error("descriptor limit reached: {0}")]
    ResourceExhausted(#[source] io::Error),

    /// Transmission would block; retry on a later poll cycle.
    #[error("operation would block")]
    WouldBlock,

    /// Fatal transport error; the face should be closed.
    #[error("transport error on {face}: {source}")]
    Transport {
        /// Face the error occurred on.
        face: FaceId,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Peer closed the connection.
    #[error("{0} closed by peer")]
    PeerClosed(FaceId),

    /// Receive buffer is full and nothing was consumed.
    #[error("receive buffer of {0} is full")]
    BufferFull(FaceId),

    /// Listener could not be created.
    #[error("cannot create {role} on port {port}: {source}")]
    Listen {
        /// Listener role.
        role: ListenRole,
        /// Requested port.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Local endpoint could not be created.
    #[error("cannot create local endpoint {name}: {source}")]
    LocalEndpoint {
        /// Printable endpoint name.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Node role does not allow this listener.
    #[error("{role} is not permitted on a {node_type} node")]
    NotPermitted {
        /// Requested listener role.
        role: ListenRole,
        /// Node role.
        node_type: NodeType,
    },

    /// Destination string could not be parsed.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// Protocol keyword is not recognized.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Protocol cannot be used for this operation.
    #[error("protocol {0} not supported here")]
    UnsupportedProtocol(Protocol),

    /// Address resolution produced nothing.
    #[error("no address for {0}")]
    NoAddress(String),

    /// Frame exceeds the maximum frame length.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Maximum frame length.
        max: usize,
    },

    /// Other I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FaceError {
    /// Check if the caller should retry on a later poll cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaceError::WouldBlock)
    }

    /// Check if this error is fatal to the face (caller should close it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FaceError::Transport { .. } | FaceError::PeerClosed(_) | FaceError::BufferFull(_)
        )
    }

    /// Check if this error reports exhausted identifiers or descriptors.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            FaceError::IdSpaceExhausted | FaceError::ResourceExhausted(_)
        )
    }

    /// Check if the input was rejected before any state was touched.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            FaceError::InvalidDestination(_)
                | FaceError::UnknownProtocol(_)
                | FaceError::NoAddress(_)
                | FaceError::FrameTooLarge { .. }
        )
    }

    /// Classify an I/O error raised on a face's transport.
    pub(crate) fn from_transport(face: FaceId, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => FaceError::WouldBlock,
            _ if is_descriptor_exhaustion(&err) => FaceError::ResourceExhausted(err),
            _ => FaceError::Transport { face, source: err },
        }
    }
}

/// Whether an I/O error means the descriptor table is full.
pub(crate) fn is_descriptor_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

/// Whether an I/O error is a transient condition rather than a failure.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Result type for face operations.
pub type FaceResult<T> = Result<T, FaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(FaceError::WouldBlock.is_retryable());
        assert!(!FaceError::PeerClosed(FaceId::new(20)).is_retryable());
        assert!(!FaceError::IdSpaceExhausted.is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        let face = FaceId::new(17);
        assert!(FaceError::PeerClosed(face).is_fatal());
        assert!(FaceError::BufferFull(face).is_fatal());
        assert!(
            FaceError::Transport {
                face,
                source: io::Error::from(io::ErrorKind::ConnectionReset),
            }
            .is_fatal()
        );

        assert!(!FaceError::WouldBlock.is_fatal());
        assert!(!FaceError::Inactive(face).is_fatal());
    }

    #[test]
    fn test_transport_classification() {
        let face = FaceId::new(16);
        let err = FaceError::from_transport(face, io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_retryable());

        let err = FaceError::from_transport(face, io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_fatal());

        let err = FaceError::from_transport(face, io::Error::from_raw_os_error(libc::EMFILE));
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_malformed_input_errors() {
        assert!(FaceError::InvalidDestination("::1::".into()).is_malformed_input());
        assert!(FaceError::UnknownProtocol("sctp".into()).is_malformed_input());
        assert!(FaceError::FrameTooLarge { len: 70000, max: 65535 }.is_malformed_input());
        assert!(!FaceError::IdSpaceExhausted.is_malformed_input());
    }
}
