//! Client certificate resolution and server certificate pinning.

pub mod resolver;
pub mod trust;

pub use resolver::{
    CertificateResolver, CertificateStore, ClientIdentity, StoreEntry, YamlIndexStore,
};
pub use trust::{thumbprint, DirectoryTrustStore, TrustedPeerStore};
