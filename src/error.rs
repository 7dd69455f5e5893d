// src/error.rs
//! Error type shared by the API client, transports and session cores.

use thiserror::Error;

/// Errors surfaced by collaborators and session operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request never produced a response (DNS, refused, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Server rejected our credentials or permissions
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// No authenticated user in the session store
    #[error("Session not ready: no authenticated user")]
    NotReady,

    /// Operation not valid for the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Real-time link is gone
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server never acknowledged a frame we sent
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ClientError {
    /// Failures worth a retry by the user; the core itself never retries.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::ConnectionClosed | ClientError::Timeout(_) => true,
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// One-line text shown to the user when an operation is rolled back.
    pub fn notice(&self) -> String {
        match self {
            ClientError::Unauthorized(_) => "You are not allowed to do that".to_string(),
            ClientError::NotReady => "Not signed in".to_string(),
            e if e.is_transient() => "Network problem, please try again".to_string(),
            e => e.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Status { status: status.as_u16(), message: e.to_string() }
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
