//! Server certificate validation policy.
//!
//! Chain validation is delegated to webpki against the Mozilla roots. When
//! that fails and self-signed certificates are permitted, the certificate is
//! accepted if its thumbprint is pinned in the trusted peer store; train
//! mode additionally pins the first unknown certificate seen
//! (trust-on-first-use).

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, info, warn};

use crate::cert::{thumbprint, TrustedPeerStore};
use crate::error::{Result, TransportError};

/// A [`ServerCertVerifier`] layering pinned-certificate acceptance on top of
/// standard webpki chain validation.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    allow_self_signed: bool,
    train_mode: bool,
    trusted_peers: Arc<dyn TrustedPeerStore>,
}

impl PinnedServerVerifier {
    /// Build a verifier over the Mozilla root set.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying webpki verifier cannot be built.
    pub fn new(
        allow_self_signed: bool,
        train_mode: bool,
        trusted_peers: Arc<dyn TrustedPeerStore>,
    ) -> Result<Self> {
        crate::tls::connector::ensure_crypto_provider();

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let webpki = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| {
                TransportError::Handshake(format!("failed to build certificate verifier: {e}"))
            })?;

        Ok(Self {
            webpki,
            allow_self_signed,
            train_mode,
            trusted_peers,
        })
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let policy_error = match self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => return Ok(verified),
            Err(e) => e,
        };

        if !self.allow_self_signed {
            return Err(policy_error);
        }

        let tp = thumbprint(end_entity.as_ref());
        if self.trusted_peers.contains(&tp) {
            debug!(thumbprint = %tp, "accepting pinned server certificate");
            return Ok(ServerCertVerified::assertion());
        }

        if self.train_mode {
            match self.trusted_peers.insert(&tp, end_entity.as_ref()) {
                Ok(()) => info!(thumbprint = %tp, "pinned previously unseen server certificate"),
                Err(e) => {
                    warn!(thumbprint = %tp, error = %e, "failed to persist pinned server certificate");
                }
            }
            return Ok(ServerCertVerified::assertion());
        }

        debug!(thumbprint = %tp, "rejecting unpinned server certificate");
        Err(policy_error)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::DirectoryTrustStore;
    use crate::tls::connector::ensure_crypto_provider;
    use tempfile::tempdir;

    #[test]
    fn test_verifier_builds_with_default_roots() {
        ensure_crypto_provider();
        let store = Arc::new(DirectoryTrustStore::default());
        assert!(PinnedServerVerifier::new(false, false, store).is_ok());
    }

    #[test]
    fn test_verifier_builds_with_directory_store() {
        ensure_crypto_provider();
        let dir = tempdir().unwrap();
        let store = Arc::new(DirectoryTrustStore::new(dir.path()));
        let verifier = PinnedServerVerifier::new(true, true, store).unwrap();
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
