//! PKCS#10 certificate signing requests.
//!
//! The requester signs the request with the private key matching the public
//! key inside it, proving possession before the CA certifies the key.
//! Requests from standard tooling (`sha256WithRSAEncryption`) and from
//! [`CertificateRequest::generate`] (RSASSA-PSS) are both accepted.

use crate::codec::{self, LEGACY_REQUEST_LABEL, REQUEST_LABEL};
use crate::error::{CaError, CaResult};
use const_oid::db::rfc5912::{ID_RSASSA_PSS, SHA_256_WITH_RSA_ENCRYPTION};
use der::Encode;
use rand::rngs::OsRng;
use rsa::pss;
use sealshare_crypto::{KeyPair, PublicKey};
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::request::CertReq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    inner: CertReq,
    der: Vec<u8>,
    subject: String,
}

impl CertificateRequest {
    /// Builds a request for `subject` and signs it with the pair's private key.
    pub fn generate(subject: &str, keypair: &KeyPair) -> CaResult<Self> {
        let name = codec::name_from_common_name(subject)?;
        let signer = keypair.private.pss_signer();
        let inner = RequestBuilder::new(name, &signer)
            .map_err(|e| CaError::Malformed(format!("request builder: {e}")))?
            .build_with_rng::<pss::Signature>(&mut OsRng)
            .map_err(|e| CaError::Malformed(format!("request signing: {e}")))?;

        let der = inner.to_der()?;
        Self::from_parts(inner, der)
    }

    pub fn from_der(bytes: &[u8]) -> CaResult<Self> {
        let inner = codec::decode_canonical::<CertReq>(bytes)?;
        Self::from_parts(inner, bytes.to_vec())
    }

    /// Accepts both the `CERTIFICATE REQUEST` and the older
    /// `NEW CERTIFICATE REQUEST` PEM labels.
    pub fn from_pem(pem: &str) -> CaResult<Self> {
        Self::from_der(&codec::pem_decode(
            pem,
            &[REQUEST_LABEL, LEGACY_REQUEST_LABEL],
        )?)
    }

    fn from_parts(inner: CertReq, der: Vec<u8>) -> CaResult<Self> {
        let subject = codec::common_name(&inner.info.subject)
            .ok_or_else(|| CaError::Malformed("request subject has no common name".into()))?;
        Ok(Self {
            inner,
            der,
            subject,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> CaResult<String> {
        codec::pem_encode(REQUEST_LABEL, &self.der)
    }

    /// Subject common name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn x509(&self) -> &CertReq {
        &self.inner
    }

    /// Checks proof of possession and returns the requested public key.
    pub fn verify_self_signature(&self) -> CaResult<PublicKey> {
        let spki = self.inner.info.public_key.to_der()?;
        let public_key = PublicKey::from_der(&spki)
            .map_err(|e| CaError::CertificateRejected(format!("public key: {e}")))?;

        let info = self.inner.info.to_der()?;
        if self.inner.signature.unused_bits() != 0 {
            return Err(CaError::CertificateRejected(
                "request signature is not whole octets".into(),
            ));
        }
        let signature = self.inner.signature.raw_bytes();

        let algorithm = self.inner.algorithm.oid;
        let verified = if algorithm == SHA_256_WITH_RSA_ENCRYPTION {
            public_key.verify_pkcs1v15(&info, signature)
        } else if algorithm == ID_RSASSA_PSS {
            public_key.verify(&info, signature)
        } else {
            return Err(CaError::CertificateRejected(format!(
                "unsupported request signature algorithm {algorithm}"
            )));
        };
        verified.map_err(|_| {
            CaError::CertificateRejected("request signature does not verify".into())
        })?;

        Ok(public_key)
    }
}
