//! TLS support for the broker connection.
//!
//! - [`connector`] wraps outbound TCP streams in TLS 1.2 with the resolved
//!   client certificate.
//! - [`verify`] implements the server trust policy: webpki validation first,
//!   then pinned self-signed acceptance with optional train mode.

pub mod connector;
pub mod verify;

pub use connector::TlsClientConnector;
pub use verify::PinnedServerVerifier;
