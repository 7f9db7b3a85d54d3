//! Configuration types for the transport.
//!
//! Options are handed in by the enclosing Kafka client; the transport itself
//! reads no files or environment variables. The serde derives exist so the
//! client can embed these records in its own configuration format.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// A resolved host/port pair identifying a single Kafka broker.
///
/// Immutable after construction. Used as an identity in log messages and
/// observability events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    addr: SocketAddr,
}

impl Endpoint {
    /// Resolve a host/port pair into an endpoint.
    ///
    /// Resolution happens once, here; the connect loop reuses the address.
    /// This performs blocking name resolution and is intended to be called
    /// during client setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be resolved.
    pub fn resolve(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        let addr = (host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::ConnectFailed {
                endpoint: format!("{host}:{port}"),
                message: "host resolved to no addresses".to_string(),
            })?;
        Ok(Self { host, port, addr })
    }

    /// The configured host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The resolved socket address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options governing connection, reconnection, and shutdown behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportOptions {
    /// Timeout for a single TCP connect attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Delay before the first reconnection attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Upper bound on the reconnection delay, in milliseconds.
    #[serde(default = "default_max_reconnect_backoff_ms")]
    pub max_reconnect_backoff_ms: u64,

    /// How long `shutdown()` waits for the transport loop to exit,
    /// in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// TLS configuration. Absent means plain TCP.
    #[serde(default)]
    pub tls: Option<TlsOptions>,
}

/// TLS configuration for the broker connection.
///
/// The client certificate reference is either a path ending in `.pfx`
/// (a PKCS#12 archive opened with `password`) or a subject name looked up
/// in the configured certificate store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsOptions {
    /// Path to a `.pfx` archive, or a subject name in the certificate store.
    pub client_cert_ref: String,

    /// Preferred friendly name when several store entries share a subject.
    #[serde(default)]
    pub friendly_name: Option<String>,

    /// Password for the `.pfx` archive.
    #[serde(default)]
    pub password: Option<String>,

    /// Accept server certificates that fail chain validation, provided they
    /// are pinned in the trusted peer store.
    #[serde(default)]
    pub allow_self_signed_server_cert: bool,

    /// Pin the first unknown server certificate seen instead of rejecting
    /// it. One-shot bootstrap; requires `allow_self_signed_server_cert`.
    #[serde(default)]
    pub self_signed_train_mode: bool,

    /// Index file of the certificate store used for subject lookups.
    #[serde(default)]
    pub store_index_path: Option<PathBuf>,

    /// Directory backing the pinned-certificate store.
    #[serde(default)]
    pub trusted_peers_dir: Option<PathBuf>,
}

// Default value functions

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_max_reconnect_backoff_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_reconnect_backoff_ms: default_max_reconnect_backoff_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            tls: None,
        }
    }
}

impl TransportOptions {
    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if any backoff parameter is degenerate or the TLS
    /// sub-record is incomplete.
    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms == 0 {
            return Err(TransportError::InvalidOptions(
                "initial_backoff_ms must be non-zero".to_string(),
            ));
        }
        if self.backoff_multiplier == 0 {
            return Err(TransportError::InvalidOptions(
                "backoff_multiplier must be at least 1".to_string(),
            ));
        }
        if self.max_reconnect_backoff_ms < self.initial_backoff_ms {
            return Err(TransportError::InvalidOptions(format!(
                "max_reconnect_backoff_ms ({}) must be >= initial_backoff_ms ({})",
                self.max_reconnect_backoff_ms, self.initial_backoff_ms
            )));
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Initial backoff delay as a [`Duration`].
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff cap as a [`Duration`].
    #[must_use]
    pub fn max_reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_backoff_ms)
    }

    /// Shutdown wait bound as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl TlsOptions {
    /// Validate the TLS sub-record.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate reference is empty or train mode
    /// is enabled without permitting self-signed certificates.
    pub fn validate(&self) -> Result<()> {
        if self.client_cert_ref.is_empty() {
            return Err(TransportError::InvalidOptions(
                "tls.client_cert_ref must not be empty".to_string(),
            ));
        }
        if self.self_signed_train_mode && !self.allow_self_signed_server_cert {
            return Err(TransportError::InvalidOptions(
                "tls.self_signed_train_mode requires allow_self_signed_server_cert".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the certificate reference points at a PKCS#12 file.
    ///
    /// The extension check is case-sensitive: `client.PFX` is treated as a
    /// store subject, not a file path.
    #[must_use]
    pub fn is_pfx_ref(&self) -> bool {
        self.client_cert_ref.ends_with(".pfx")
    }
}
