//! Error types for connection setup and calls.

use finagle_thrift_core::{ApplicationException, MessageType, ProtocolError};

/// Invalid construction-time configuration. Raised before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("client_id must not be empty")]
    MissingClientId,
    #[error("either host/port or unix_socket must be provided")]
    MissingTarget,
    #[error("host/port and unix_socket are mutually exclusive")]
    ConflictingTargets,
    #[error("port is required when host is set")]
    MissingPort,
    #[error("TLS only works with host:port, not unix_socket")]
    TlsOverUnixSocket,
    #[error("TLS requires a cafile or an ssl_context")]
    IncompleteTls,
    #[error("keyfile was given without a certfile")]
    KeyWithoutCertificate,
}

/// Errors surfaced by [`TracingClient`](crate::TracingClient) and the
/// underlying call pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid certificate material in {path}: {reason}")]
    Certificate { path: String, reason: String },
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),
    #[error("decode error: {0}")]
    Decode(#[source] ProtocolError),
    #[error("server raised application exception: {0}")]
    Application(ApplicationException),
    #[error("expected a reply to {method}, got a {actual:?} message")]
    UnexpectedMessageType {
        method: String,
        actual: MessageType,
    },
    #[error("expected a reply to {expected}, got one for {actual}")]
    WrongMethodName { expected: String, actual: String },
    #[error("reply sequence id {actual} does not match request {expected}")]
    BadSequenceId { expected: i32, actual: i32 },
}

impl ClientError {
    /// Whether the connection should be discarded after this error.
    ///
    /// Application exceptions leave the stream aligned on a message boundary;
    /// everything else may have left partial frames behind.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io) => Self::Transport(io),
            other => Self::Decode(other),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err)
    }
}
