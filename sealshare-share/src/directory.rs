//! Lookup of identity certificates.
//!
//! The sharing protocol never trusts what a directory returns: every
//! certificate is verified against the CA trust anchor before its key is
//! used.

use crate::error::DirectoryError;
use async_trait::async_trait;
use dashmap::DashMap;
use sealshare_pki::Certificate;
use tracing::debug;

/// Source of identity certificates (typically a CA-backed service).
#[async_trait]
pub trait CertificateDirectory: Send + Sync {
    async fn certificate(&self, identity: &str) -> Result<Certificate, DirectoryError>;
}

/// Directory held in memory, keyed by certificate subject.
#[derive(Default)]
pub struct MemoryCertificateDirectory {
    certificates: DashMap<String, Certificate>,
}

impl MemoryCertificateDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `certificate` under its subject, replacing any earlier one.
    pub fn publish(&self, certificate: Certificate) {
        debug!(
            "Published certificate {} for {}",
            certificate.serial(),
            certificate.subject()
        );
        self.certificates
            .insert(certificate.subject().to_string(), certificate);
    }

    pub fn remove(&self, identity: &str) -> Option<Certificate> {
        self.certificates.remove(identity).map(|(_, cert)| cert)
    }
}

#[async_trait]
impl CertificateDirectory for MemoryCertificateDirectory {
    async fn certificate(&self, identity: &str) -> Result<Certificate, DirectoryError> {
        self.certificates
            .get(identity)
            .map(|c| c.value().clone())
            .ok_or_else(|| DirectoryError::NotFound(identity.to_string()))
    }
}
