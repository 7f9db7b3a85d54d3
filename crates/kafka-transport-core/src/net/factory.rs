//! Connection establishment.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::cert::{CertificateResolver, CertificateStore, TrustedPeerStore};
use crate::config::{Endpoint, TransportOptions};
use crate::error::{Result, TransportError};
use crate::net::stream::TransportStream;
use crate::tls::TlsClientConnector;

/// Opens connections to the endpoint, optionally TLS-wrapped.
///
/// At most one connect attempt is outstanding per transport; that
/// serialisation is enforced by the transport loop, which is the factory's
/// only caller.
pub struct ConnectionFactory {
    endpoint: Endpoint,
    connect_timeout: Duration,
    tls: Option<TlsClientConnector>,
}

impl ConnectionFactory {
    /// Create a factory for the endpoint.
    ///
    /// When TLS is configured the client certificate is resolved here, so
    /// `CertificateNotFound` and load failures surface at construction.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be realised.
    pub fn new(
        endpoint: Endpoint,
        options: &TransportOptions,
        store: Arc<dyn CertificateStore>,
        trusted_peers: Arc<dyn TrustedPeerStore>,
    ) -> Result<Self> {
        let tls = match &options.tls {
            Some(tls_options) => {
                let resolver = CertificateResolver::new(store);
                Some(TlsClientConnector::new(
                    tls_options,
                    &resolver,
                    trusted_peers,
                )?)
            }
            None => None,
        };

        Ok(Self {
            endpoint,
            connect_timeout: options.connect_timeout(),
            tls,
        })
    }

    /// The endpoint this factory connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Open a connection, performing the TLS handshake when configured.
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailed` when the TCP connection cannot be
    /// established, or `HandshakeFailed` when the TLS handshake is rejected.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn connect(&self) -> Result<TransportStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(self.endpoint.addr())).await;

        let tcp = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to connect");
                return Err(TransportError::ConnectFailed {
                    endpoint: self.endpoint.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("connection timeout");
                return Err(TransportError::ConnectFailed {
                    endpoint: self.endpoint.to_string(),
                    message: "connection timeout".to_string(),
                });
            }
        };

        debug!("tcp connection established");

        match &self.tls {
            None => Ok(TransportStream::plain(tcp)),
            Some(connector) => {
                let stream = connector.connect(self.endpoint.host(), tcp).await?;
                debug!("tls handshake complete");
                Ok(TransportStream::tls(stream))
            }
        }
    }
}
