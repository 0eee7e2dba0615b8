//! Face manager configuration.
//!
//! Loaded in layers: defaults, then an optional TOML file, then environment
//! overrides. Command-line flags are applied last by the binary.
//!
//! ```toml
//! node_type = "router"
//! port = 9896
//! ndn_port = 6363
//! listen_ndn = false
//! local_kind = "stream"
//! local_namespace = "auto"
//! local_socket_path = "/run/ccnd/ccnd.sock"
//! max_faces = 512
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::NodeType;
use crate::core::constants::{
    DEFAULT_MAX_FACES, DEFAULT_NDN_PORT, DEFAULT_PORT, DEFAULT_TCP_BACKLOG, LOCAL_ABSTRACT_NAME,
    RESERVED_FACE_IDS,
};
use crate::face::{LocalKind, LocalProfile, NamespacePolicy};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Environment Variables
// =============================================================================

/// Overrides `port`.
pub const ENV_PORT: &str = "CCND_PORT";
/// Overrides `node_type`.
pub const ENV_NODE_TYPE: &str = "CCND_NODE_TYPE";
/// Overrides `local_socket_path`.
pub const ENV_LOCAL_SOCKET: &str = "CCND_LOCAL_SOCKET";
/// Overrides `max_faces`.
pub const ENV_MAX_FACES: &str = "CCND_MAX_FACES";

// =============================================================================
// Configuration
// =============================================================================

/// Face manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaceConfig {
    /// Node role.
    pub node_type: NodeType,
    /// Port of the UDP and TCP listeners.
    pub port: u16,
    /// Port of the NDN-compatible listener.
    pub ndn_port: u16,
    /// Open the UDP listeners.
    pub listen_udp: bool,
    /// Open the TCP listeners.
    pub listen_tcp: bool,
    /// Open the NDN-compatible listeners.
    pub listen_ndn: bool,
    /// Local endpoint flavor.
    pub local_kind: LocalKind,
    /// Local endpoint naming policy.
    pub local_namespace: NamespacePolicy,
    /// Filesystem path of the local socket. Platform default when unset.
    pub local_socket_path: Option<PathBuf>,
    /// Abstract-namespace name of the local socket.
    pub local_abstract_name: String,
    /// Number of face slots, reserved included.
    pub max_faces: u16,
    /// Listen backlog of TCP listeners.
    pub tcp_backlog: i32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            node_type: NodeType::default(),
            port: DEFAULT_PORT,
            ndn_port: DEFAULT_NDN_PORT,
            listen_udp: true,
            listen_tcp: true,
            listen_ndn: false,
            local_kind: LocalKind::default(),
            local_namespace: NamespacePolicy::default(),
            local_socket_path: None,
            local_abstract_name: LOCAL_ABSTRACT_NAME.to_string(),
            max_faces: DEFAULT_MAX_FACES,
            tcp_backlog: DEFAULT_TCP_BACKLOG,
        }
    }
}

impl FaceConfig {
    /// Load configuration: defaults, then `path` if given, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_PORT) {
            self.port = parse_env(ENV_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_NODE_TYPE) {
            self.node_type = NodeType::from_name(&value).ok_or_else(|| {
                ConfigError::ValidationError(format!("{ENV_NODE_TYPE}: unknown node type {value:?}"))
            })?;
        }
        if let Some(value) = lookup(ENV_LOCAL_SOCKET) {
            self.local_socket_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_MAX_FACES) {
            self.max_faces = parse_env(ENV_MAX_FACES, &value)?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_faces <= RESERVED_FACE_IDS {
            return Err(ConfigError::ValidationError(format!(
                "max_faces must exceed the {RESERVED_FACE_IDS} reserved identifiers, got {}",
                self.max_faces
            )));
        }
        if self.tcp_backlog <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "tcp_backlog must be positive, got {}",
                self.tcp_backlog
            )));
        }
        if self.local_abstract_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "local_abstract_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the local endpoint naming for this platform.
    pub fn local_profile(&self) -> LocalProfile {
        LocalProfile::resolve(
            self.local_namespace,
            self.local_socket_path.as_deref(),
            &self.local_abstract_name,
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FaceConfig::default();
        assert_eq!(config.port, 9896);
        assert_eq!(config.ndn_port, 6363);
        assert_eq!(config.max_faces, 512);
        assert_eq!(config.node_type, NodeType::Router);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FaceConfig::from_toml_str(
            r#"
            node_type = "consumer"
            port = 10000
            local_kind = "datagram"
            "#,
        )
        .unwrap();
        assert_eq!(config.node_type, NodeType::Consumer);
        assert_eq!(config.port, 10000);
        assert_eq!(config.local_kind, LocalKind::Datagram);
        assert_eq!(config.ndn_port, 6363);
        assert!(config.listen_udp);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = FaceConfig::from_toml_str("prot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_PORT, "7000"),
            (ENV_NODE_TYPE, "receiver"),
            (ENV_LOCAL_SOCKET, "/tmp/x.sock"),
        ]
        .into_iter()
        .collect();

        let mut config = FaceConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.node_type, NodeType::Consumer);
        assert_eq!(config.local_socket_path, Some(PathBuf::from("/tmp/x.sock")));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = FaceConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_MAX_FACES).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validation_rejects_small_table() {
        let config = FaceConfig {
            max_faces: 16,
            ..FaceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ccnd.toml");
        std::fs::write(&path, "max_faces = 64\nlisten_tcp = false\n").unwrap();

        let config = FaceConfig::from_file(&path).unwrap();
        assert_eq!(config.max_faces, 64);
        assert!(!config.listen_tcp);

        let missing = FaceConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));
    }
}
