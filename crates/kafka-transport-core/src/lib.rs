//! Kafka Client Transport Core Library
//!
//! A resilient, duplex, request-oriented TCP transport for a Kafka client:
//! a single-endpoint connection manager that accepts read and write
//! requests from many concurrent callers, multiplexes them over one socket
//! (plain or TLS 1.2), transparently re-establishes the connection with
//! exponential backoff, and delivers each caller's result or a typed
//! failure.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Endpoint and transport options
//! - [`error`] - Domain-specific error types
//! - [`backoff`] - Reconnection delay computation
//! - [`queue`] - Request queues feeding the transport loop
//! - [`events`] - Observability event hooks
//! - [`cert`] - Client certificate resolution and server pinning
//! - [`tls`] - TLS connector and trust policy
//! - [`net`] - Socket establishment and the unified stream type
//! - [`transport`] - The owning loop and the public handle
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_transport_core::{Endpoint, KafkaTransport, TransportOptions, WritePayload};
//!
//! let endpoint = Endpoint::resolve("broker-1", 9092)?;
//! let transport = KafkaTransport::new(endpoint, TransportOptions::default())?;
//!
//! transport.write(WritePayload::new(request_bytes, correlation_id, api_key, 1)).await?;
//! let response = transport.read(response_len).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::redundant_closure)]

pub mod backoff;
pub mod cert;
pub mod config;
pub mod error;
pub mod events;
pub mod net;
pub mod queue;
pub mod tls;
pub mod transport;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing`
/// feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use cert::{CertificateResolver, CertificateStore, DirectoryTrustStore, TrustedPeerStore};
pub use config::{Endpoint, TlsOptions, TransportOptions};
pub use error::{Result, TransportError};
pub use net::{ConnectionFactory, TransportStream};
pub use transport::{KafkaTransport, WritePayload};
