//! Error handling module
//!
//! This module defines the error types and result type aliases used in the crate,
//! and how they surface to gRPC callers as a [`tonic::Status`].

use std::io;
use thiserror::Error;
use tonic::Status;

/// gRPC interception proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The outbound secure channel to the node could not be established
    #[error("Connection setup error: {0}")]
    ConnectionSetup(String),

    /// Lifecycle operation called in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<ProxyError> for Status {
    fn from(err: ProxyError) -> Self {
        match &err {
            ProxyError::ConnectionSetup(_) | ProxyError::TlsHandshake(_) | ProxyError::Io(_) => {
                Status::unavailable(err.to_string())
            }
            ProxyError::InvalidState(_) => Status::failed_precondition(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}
