//! TLS connector for the broker connection.
//!
//! Wraps TCP streams in TLS 1.2 with mutual authentication: the resolved
//! client certificate is always presented, and server validation goes
//! through [`PinnedServerVerifier`].

use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tracing::debug;

use crate::cert::{CertificateResolver, TrustedPeerStore};
use crate::config::TlsOptions;
use crate::error::{Result, TransportError};
use crate::tls::verify::PinnedServerVerifier;

/// Install the ring crypto provider if not already installed.
pub(crate) fn ensure_crypto_provider() {
    // Try to install the ring provider, ignore errors if already installed
    let _ = CryptoProvider::install_default(default_provider());
}

/// TLS connector presenting the configured client certificate.
///
/// The protocol is pinned to TLS 1.2, the compatibility floor of the brokers
/// this transport targets.
#[derive(Clone)]
pub struct TlsClientConnector {
    inner: TokioTlsConnector,
}

impl TlsClientConnector {
    /// Build a connector from TLS options.
    ///
    /// Resolves the client certificate eagerly, so configuration errors
    /// surface at construction rather than on the first connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the client certificate cannot be resolved or the
    /// TLS configuration is invalid.
    pub fn new(
        options: &TlsOptions,
        resolver: &CertificateResolver,
        trusted_peers: Arc<dyn TrustedPeerStore>,
    ) -> Result<Self> {
        ensure_crypto_provider();

        let identity = resolver.resolve(options)?;
        let verifier = Arc::new(PinnedServerVerifier::new(
            options.allow_self_signed_server_cert,
            options.self_signed_train_mode,
            trusted_peers,
        )?);

        let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(identity.chain, identity.key)
            .map_err(|e| {
                TransportError::Handshake(format!("failed to configure client certificate: {e}"))
            })?;

        Ok(Self {
            inner: TokioTlsConnector::from(Arc::new(config)),
        })
    }

    /// Perform the TLS handshake over an established TCP stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn connect(
        &self,
        server_name: &str,
        stream: TcpStream,
    ) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| TransportError::Handshake(format!("invalid server name: {e}")))?;

        debug!("initiating TLS handshake");

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))
    }
}
