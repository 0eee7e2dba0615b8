//! Local inter-process endpoint.
//!
//! Applications attach through a Unix-domain socket under the reserved
//! local Face-ID. How that socket is named is a platform policy resolved once
//! at startup into a [`LocalProfile`]:
//!
//! - `Filesystem`: an ordinary socket path, removed when the endpoint closes
//! - `Abstract`: a length-addressed name in the abstract namespace, with no
//!   terminating NUL (required where the filesystem is not writable, e.g.
//!   Android application sandboxes)

use std::fmt;
use std::io;
use std::os::unix::net::{self, UnixDatagram, UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::manager::FaceManager;
use super::slot::{Face, FaceSlot, ListenSocket, Listener, SocketPathGuard, Transport};
use crate::core::constants::{LOCAL_ABSTRACT_NAME, LOCAL_SOCKET_FILE};
use crate::core::{FaceError, FaceId, FaceResult, Protocol};

/// Flavor of the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalKind {
    /// Listening stream socket; each application gets its own face.
    #[default]
    Stream,
    /// One datagram socket shared by all applications.
    Datagram,
}

/// Naming policy for the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespacePolicy {
    /// Abstract namespace on platforms that require it, filesystem elsewhere.
    #[default]
    Auto,
    /// Always use a filesystem path.
    Filesystem,
    /// Always use the abstract namespace.
    Abstract,
}

/// Resolved name of the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalProfile {
    /// Socket file at this path.
    Filesystem(PathBuf),
    /// Abstract-namespace name (raw bytes, no terminator).
    Abstract(Vec<u8>),
}

/// Platforms whose application sandboxes require abstract socket names.
const ABSTRACT_ONLY_PLATFORMS: &[&str] = &["android"];

impl LocalProfile {
    /// Resolve the naming policy for the running platform.
    pub fn resolve(policy: NamespacePolicy, path: Option<&Path>, abstract_name: &str) -> Self {
        let use_abstract = match policy {
            NamespacePolicy::Filesystem => false,
            NamespacePolicy::Abstract => true,
            NamespacePolicy::Auto => ABSTRACT_ONLY_PLATFORMS.contains(&std::env::consts::OS),
        };
        if use_abstract {
            Self::Abstract(abstract_name.as_bytes().to_vec())
        } else {
            Self::Filesystem(path.map_or_else(default_socket_path, Path::to_path_buf))
        }
    }

    /// Socket address of this profile.
    pub fn socket_addr(&self) -> io::Result<net::SocketAddr> {
        match self {
            Self::Filesystem(path) => net::SocketAddr::from_pathname(path),
            Self::Abstract(name) => abstract_addr(name),
        }
    }

    /// Connect to the endpoint as an application would.
    pub fn connect_stream(&self) -> io::Result<UnixStream> {
        UnixStream::connect_addr(&self.socket_addr()?)
    }

    fn bind_stream(&self) -> io::Result<(UnixListener, Option<SocketPathGuard>)> {
        let guard = self.prepare()?;
        let listener = UnixListener::bind_addr(&self.socket_addr()?)?;
        listener.set_nonblocking(true)?;
        Ok((listener, guard))
    }

    fn bind_datagram(&self) -> io::Result<(UnixDatagram, Option<SocketPathGuard>)> {
        let guard = self.prepare()?;
        let socket = UnixDatagram::bind_addr(&self.socket_addr()?)?;
        socket.set_nonblocking(true)?;
        Ok((socket, guard))
    }

    /// Create the parent directory and clear a stale socket file.
    fn prepare(&self) -> io::Result<Option<SocketPathGuard>> {
        let Self::Filesystem(path) = self else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(Some(SocketPathGuard(path.clone())))
    }
}

impl fmt::Display for LocalProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem(path) => write!(f, "{}", path.display()),
            Self::Abstract(name) => write!(f, "@{}", String::from_utf8_lossy(name)),
        }
    }
}

impl Default for LocalProfile {
    fn default() -> Self {
        Self::resolve(NamespacePolicy::Auto, None, LOCAL_ABSTRACT_NAME)
    }
}

/// Default path of the local socket.
///
/// Uses `XDG_RUNTIME_DIR` if set, otherwise the system temp directory.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(LOCAL_SOCKET_FILE)
}

#[cfg(target_os = "linux")]
fn abstract_addr(name: &[u8]) -> io::Result<net::SocketAddr> {
    use std::os::linux::net::SocketAddrExt;
    net::SocketAddr::from_abstract_name(name)
}

#[cfg(target_os = "android")]
fn abstract_addr(name: &[u8]) -> io::Result<net::SocketAddr> {
    use std::os::android::net::SocketAddrExt;
    net::SocketAddr::from_abstract_name(name)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn abstract_addr(_name: &[u8]) -> io::Result<net::SocketAddr> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket namespace not available on this platform",
    ))
}

impl FaceManager {
    /// Create the local endpoint under the reserved local Face-ID.
    ///
    /// Idempotent: an open local endpoint is returned as is.
    pub fn local_face_create(&mut self, kind: LocalKind) -> FaceResult<FaceId> {
        let id = FaceId::LOCAL;
        if self.check_active(id) {
            return Ok(id);
        }

        let profile = self.local_profile().clone();
        let endpoint_error = |source| FaceError::LocalEndpoint {
            name: profile.to_string(),
            source,
        };

        let slot = match kind {
            LocalKind::Stream => {
                let (listener, guard) = profile.bind_stream().map_err(endpoint_error)?;
                FaceSlot::Listening(Listener::new(
                    id,
                    Protocol::Local,
                    ListenSocket::LocalStream(listener),
                    guard,
                ))
            }
            LocalKind::Datagram => {
                // Faces carry no path; the manager holds the guard until close.
                let (socket, guard) = profile.bind_datagram().map_err(endpoint_error)?;
                self.local_path_guard = guard;
                FaceSlot::Local(Face::new(
                    id,
                    Protocol::Local,
                    Transport::LocalDatagram(socket),
                    None,
                ))
            }
        };
        self.table.install_reserved(id, slot);

        tracing::info!(face = %id, endpoint = %profile, ?kind, "local endpoint listening");
        Ok(id)
    }
}
