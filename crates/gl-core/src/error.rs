//! Core error types for guidelink

use std::path::PathBuf;

use gl_protocol::{ProtocolError, RpcError};
use thiserror::Error;

/// Top-level error type for the guidelink crates
#[derive(Error, Debug)]
pub enum GlError {
    /// Profile store error
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Guider session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Wire protocol framing error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GlError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GlError::Profile(e) => e.kind(),
            GlError::Session(e) => e.kind(),
            GlError::Config(_) => ErrorKind::InvalidArgument,
            GlError::Protocol(_) => ErrorKind::ProtocolError,
            GlError::Io(_) => ErrorKind::IoFailure,
        }
    }
}

/// Stable classification of every failure, for callers that map errors
/// onto status codes or error tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    NotConnected,
    ConnectExhausted,
    ConnectCancelled,
    ProtocolError,
    Timeout,
    IoFailure,
}

impl ErrorKind {
    /// Stable string tag
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::ConnectExhausted => "connect_exhausted",
            ErrorKind::ConnectCancelled => "connect_cancelled",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::IoFailure => "io_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Profile store errors
#[derive(Error, Debug)]
pub enum ProfileError {
    /// File, profile or setting not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad profile number, identical source and destination, empty name
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading or writing the profile file failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProfileError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProfileError::NotFound(_) => ErrorKind::NotFound,
            ProfileError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ProfileError::Io { .. } => ErrorKind::IoFailure,
        }
    }
}

/// Guider session errors.
///
/// `Clone` so that one connect outcome can be handed to every caller
/// waiting on the same attempt sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No live connection to the guider
    #[error("Not connected to the guider")]
    NotConnected,

    /// Every connect attempt failed
    #[error("Could not connect to guider at {host}:{port} after {attempts} attempt(s): {last_error}")]
    ConnectExhausted {
        host: String,
        port: u16,
        attempts: u32,
        last_error: String,
    },

    /// The connect sequence was cancelled
    #[error("Connect to guider cancelled")]
    ConnectCancelled,

    /// The connect sequence ran past its deadline
    #[error("Connect to guider did not finish within {seconds}s")]
    ConnectDeadline { seconds: u64 },

    /// The guider answered with an error
    #[error("Guider error: {0}")]
    Protocol(#[from] RpcError),

    /// The connection failed underneath a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived in time
    #[error("Guider did not answer '{method}' in time")]
    Timeout { method: String },

    /// The guider answered with a result of the wrong shape
    #[error("Unexpected result from '{method}': {detail}")]
    UnexpectedResponse { method: String, detail: String },
}

impl SessionError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::ConnectExhausted { .. } => ErrorKind::ConnectExhausted,
            SessionError::ConnectCancelled | SessionError::ConnectDeadline { .. } => {
                ErrorKind::ConnectCancelled
            }
            SessionError::Protocol(_) | SessionError::UnexpectedResponse { .. } => {
                ErrorKind::ProtocolError
            }
            SessionError::Transport(_) => ErrorKind::IoFailure,
            SessionError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(SessionError::NotConnected.kind().tag(), "not_connected");
        assert_eq!(
            ProfileError::InvalidArgument("n".into()).kind().tag(),
            "invalid_argument"
        );
        let err: GlError = SessionError::Protocol(RpcError::new(1, "Invalid axis")).into();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }

    #[test]
    fn test_exhausted_message_names_endpoint() {
        let err = SessionError::ConnectExhausted {
            host: "obs".into(),
            port: 4400,
            attempts: 3,
            last_error: "Connection refused".into(),
        };
        let text = err.to_string();
        assert!(text.contains("obs:4400"));
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("Connection refused"));
    }
}
