//! Domain error types for the Kafka client transport.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors that occur while constructing or operating a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport has been shut down. Terminal: every pending and
    /// subsequently enqueued request fails with this error.
    #[error("transport has been disposed")]
    Disposed,

    /// The TCP or TLS stream ended, returned zero bytes, or died while a
    /// request was in flight. The transport reconnects; the failed request
    /// is not retried.
    #[error("server disconnected")]
    ServerDisconnected,

    /// A connection attempt failed. Absorbed by the reconnect loop and
    /// retried with backoff.
    #[error("failed to connect to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    /// No certificate in the store matched the configured subject.
    #[error("client certificate not found for subject '{subject}'")]
    CertificateNotFound { subject: String },

    /// A certificate or private key could not be read or decoded.
    #[error("failed to load certificate material from '{path}': {message}")]
    CertificateLoad { path: String, message: String },

    /// The TLS handshake was rejected.
    #[error("tls handshake failed: {0}")]
    Handshake(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Transport options failed validation.
    #[error("invalid transport options: {0}")]
    InvalidOptions(String),

    /// A request was malformed before it reached the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
