//! Pinned-certificate store for self-signed server certificates.
//!
//! Operators pre-pin certificates by thumbprint; train mode pins the first
//! unknown certificate seen. The store is a trait so platforms with a system
//! "trusted people" store can substitute their own; the shipped
//! [`DirectoryTrustStore`] keeps one DER file per thumbprint.

use std::fmt;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex-encoded SHA-256 thumbprint of a DER-encoded certificate.
#[must_use]
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// A store of pinned server certificates, keyed by thumbprint.
///
/// Called from inside the TLS handshake, so implementations must be
/// synchronous and quick.
pub trait TrustedPeerStore: Send + Sync + fmt::Debug {
    /// Whether a certificate with this thumbprint has been pinned.
    fn contains(&self, thumbprint: &str) -> bool;

    /// Pin a certificate. Pinning the same thumbprint twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn insert(&self, thumbprint: &str, der: &[u8]) -> std::io::Result<()>;
}

/// Directory-backed peer store: `<dir>/<thumbprint>.der`, one file per
/// pinned certificate.
///
/// With no directory configured the store is empty and read-only.
#[derive(Debug, Clone, Default)]
pub struct DirectoryTrustStore {
    dir: Option<PathBuf>,
}

impl DirectoryTrustStore {
    /// Create a store over the given directory. The directory is created on
    /// first insert.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Create a store from an optional directory.
    #[must_use]
    pub fn from_options(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    fn entry_path(&self, thumbprint: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{thumbprint}.der")))
    }
}

impl TrustedPeerStore for DirectoryTrustStore {
    fn contains(&self, thumbprint: &str) -> bool {
        self.entry_path(thumbprint)
            .is_some_and(|path| path.is_file())
    }

    fn insert(&self, thumbprint: &str, der: &[u8]) -> std::io::Result<()> {
        let Some(path) = self.entry_path(thumbprint) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no trusted peer directory configured",
            ));
        };
        if path.is_file() {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, der)?;
        debug!(thumbprint, path = %path.display(), "pinned server certificate");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_thumbprint_stable_and_distinct() {
        let a = thumbprint(b"certificate-a");
        let b = thumbprint(b"certificate-b");
        assert_eq!(a, thumbprint(b"certificate-a"));
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_insert_then_contains() {
        let dir = tempdir().unwrap();
        let store = DirectoryTrustStore::new(dir.path());
        let tp = thumbprint(b"server-cert");

        assert!(!store.contains(&tp));
        store.insert(&tp, b"server-cert").unwrap();
        assert!(store.contains(&tp));
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = DirectoryTrustStore::new(dir.path().join("peers"));
        let tp = thumbprint(b"server-cert");

        store.insert(&tp, b"server-cert").unwrap();
        store.insert(&tp, b"server-cert").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("peers"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unconfigured_store_is_empty() {
        let store = DirectoryTrustStore::default();
        let tp = thumbprint(b"server-cert");
        assert!(!store.contains(&tp));
        assert!(store.insert(&tp, b"server-cert").is_err());
    }
}
