//! Error types for the sync server.

use fleetsync_core::CoreError;
use fleetsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The reporting node has no record.
    #[error("unknown node: {namespace}/{name}")]
    UnknownNode {
        /// Namespace from the message metadata.
        namespace: String,
        /// Node name from the message metadata.
        name: String,
    },

    /// Protocol version mismatch.
    #[error("protocol version mismatch: server speaks {expected}, got {actual}")]
    ProtocolMismatch {
        /// Version this server speaks.
        expected: u16,
        /// Version the node sent.
        actual: u16,
    },

    /// Malformed message or payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Control plane error.
    #[error("control plane error: {0}")]
    Core(#[from] CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::UnknownNode { .. }
            | ServerError::ProtocolMismatch { .. }
            | ServerError::Protocol(_) => true,
            ServerError::Core(err) => err.is_client_error(),
            ServerError::Internal(_) => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
