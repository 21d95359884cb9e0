//! Error taxonomy for a capture session.
//!
//! Fatal kinds (`AuthError`, `DirectoryError`, `ConfigError`, `SinkError`) abort
//! the session before streaming starts. `StreamError` ends streaming but still
//! runs finalization. `EncodeError` and `InferenceError` are per-frame and are
//! logged and swallowed by the sink that raised them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider rejected credentials (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("client secret unavailable: {0}")]
    MissingSecret(String),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("camera directory returned HTTP {0}")]
    Status(u16),
    #[error("camera directory unreachable: {0}")]
    Unreachable(String),
    #[error("malformed camera list: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("stream call rejected: {0}")]
    Rejected(String),
    #[error("stream transport error: {0}")]
    Transport(String),
    #[error("invalid stream request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame {seq} could not be decoded: {reason}")]
    Decode { seq: u64, reason: String },
    #[error("encoder rejected frame {seq}: {reason}")]
    Write { seq: u64, reason: String },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("detector '{backend}' failed on frame {seq}: {reason}")]
    Detect {
        backend: &'static str,
        seq: u64,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open {what}: {reason}")]
    Open { what: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("camera id '{0}' is not present in the camera directory")]
    UnknownCamera(String),
    #[error("selection aborted: {0}")]
    SelectionAborted(String),
}

/// Any error that ends a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
