//! Client-side certificate verification.
//!
//! A [`TrustAnchor`] holds only the CA certificate, as downloaded from
//! [`CertificateAuthority::ca_certificate`](crate::CertificateAuthority::ca_certificate).
//! It never needs the CA private key.

use crate::certificate::{Certificate, KeyUsage};
use crate::error::{CaError, CaResult};
use chrono::{DateTime, Utc};
use sealshare_crypto::PublicKey;

#[derive(Debug, Clone)]
pub struct TrustAnchor {
    certificate: Certificate,
    public_key: PublicKey,
}

impl TrustAnchor {
    /// Accepts a self-signed CA certificate as the root of trust.
    pub fn from_certificate(certificate: Certificate) -> CaResult<Self> {
        if certificate.usage() != KeyUsage::Ca || !certificate.is_self_issued() {
            return Err(CaError::CertificateExpiredOrInvalid);
        }
        let public_key = certificate
            .public_key()
            .map_err(|_| CaError::CertificateExpiredOrInvalid)?;
        certificate.verify_signature(&public_key)?;

        Ok(Self {
            certificate,
            public_key,
        })
    }

    pub fn from_pem(pem: &str) -> CaResult<Self> {
        Self::from_certificate(Certificate::from_pem(pem)?)
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Verifies `certificate` against this anchor at the current time and
    /// returns the certified key.
    pub fn verify(&self, certificate: &Certificate) -> CaResult<PublicKey> {
        self.verify_at(certificate, Utc::now())
    }

    /// Verifies issuer name, signature and validity window at `at`.
    ///
    /// All failures return [`CaError::CertificateExpiredOrInvalid`].
    pub fn verify_at(&self, certificate: &Certificate, at: DateTime<Utc>) -> CaResult<PublicKey> {
        if certificate.x509().tbs_certificate.issuer != *self.certificate.subject_name() {
            return Err(CaError::CertificateExpiredOrInvalid);
        }
        certificate.verify_signature(&self.public_key)?;
        certificate.check_validity(at)?;
        certificate
            .public_key()
            .map_err(|_| CaError::CertificateExpiredOrInvalid)
    }
}
