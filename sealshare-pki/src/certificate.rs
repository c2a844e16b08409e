//! X.509 identity certificates.
//!
//! The root is a self-signed v3 certificate with `BasicConstraints(CA=true)`;
//! leaves carry `BasicConstraints(CA=false)` and key encipherment usage. Both
//! are signed with RSASSA-PSS (SHA-256).

use crate::codec::{self, CERTIFICATE_LABEL};
use crate::error::{CaError, CaResult};
use chrono::{DateTime, Utc};
use const_oid::db::rfc5912::ID_CE_BASIC_CONSTRAINTS;
use der::{Decode, Encode};
use rand::rngs::OsRng;
use rsa::pss;
use sealshare_crypto::{PrivateKey, PublicKey};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::TbsCertificate;

/// What the certified key may be used for, from `BasicConstraints`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// Signs other certificates. Only the root carries this.
    Ca,
    /// Identity key used to receive wrapped content keys.
    Leaf,
}

/// Fields of a certificate about to be signed.
pub(crate) struct CertificateTemplate<'a> {
    /// Big-endian serial; must be positive and canonical.
    pub serial: &'a [u8],
    pub subject: &'a str,
    pub subject_key: &'a PublicKey,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A parsed certificate together with the DER it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    serial: String,
    subject: String,
    issuer: String,
    usage: KeyUsage,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl Certificate {
    /// Builds a self-signed CA certificate for `key`.
    pub(crate) fn self_signed_root(
        template: CertificateTemplate<'_>,
        key: &PrivateKey,
    ) -> CaResult<Self> {
        Self::build(Profile::Root, template, key)
    }

    /// Builds a leaf certificate signed by `issuer`, whose private key is
    /// `issuer_key`.
    pub(crate) fn issue_leaf(
        template: CertificateTemplate<'_>,
        issuer: &Certificate,
        issuer_key: &PrivateKey,
    ) -> CaResult<Self> {
        let profile = Profile::Leaf {
            issuer: issuer.subject_name().clone(),
            enable_key_agreement: false,
            enable_key_encipherment: true,
        };
        Self::build(profile, template, issuer_key)
    }

    fn build(
        profile: Profile,
        template: CertificateTemplate<'_>,
        signing_key: &PrivateKey,
    ) -> CaResult<Self> {
        let serial_number = SerialNumber::new(template.serial)?;
        let validity = Validity {
            not_before: codec::to_x509_time(template.not_before)?,
            not_after: codec::to_x509_time(template.not_after)?,
        };
        let subject = codec::name_from_common_name(template.subject)?;
        let public_key = SubjectPublicKeyInfoOwned::from_der(&template.subject_key.to_der()?)?;

        let signer = signing_key.pss_signer();
        let inner = CertificateBuilder::new(
            profile,
            serial_number,
            validity,
            subject,
            public_key,
            &signer,
        )
        .map_err(|e| CaError::Malformed(format!("certificate builder: {e}")))?
        .build_with_rng::<pss::Signature>(&mut OsRng)
        .map_err(|e| CaError::Malformed(format!("certificate signing: {e}")))?;

        let der = inner.to_der()?;
        Self::from_parts(inner, der)
    }

    /// Parses a DER certificate. Only canonical DER signed with this CA's
    /// algorithm is accepted.
    pub fn from_der(bytes: &[u8]) -> CaResult<Self> {
        let inner = codec::decode_canonical::<x509_cert::Certificate>(bytes)?;
        Self::from_parts(inner, bytes.to_vec())
    }

    pub fn from_pem(pem: &str) -> CaResult<Self> {
        Self::from_der(&codec::pem_decode(pem, &[CERTIFICATE_LABEL])?)
    }

    fn from_parts(inner: x509_cert::Certificate, der: Vec<u8>) -> CaResult<Self> {
        let algorithm = codec::pss_sha256_algorithm()?;
        if inner.signature_algorithm != algorithm || inner.tbs_certificate.signature != algorithm {
            return Err(CaError::Malformed(format!(
                "unsupported signature algorithm {}",
                inner.signature_algorithm.oid
            )));
        }
        if inner.signature.unused_bits() != 0 {
            return Err(CaError::Malformed("signature is not whole octets".into()));
        }

        let tbs = &inner.tbs_certificate;
        let subject = codec::common_name(&tbs.subject)
            .ok_or_else(|| CaError::Malformed("subject has no common name".into()))?;
        let issuer = codec::common_name(&tbs.issuer)
            .ok_or_else(|| CaError::Malformed("issuer has no common name".into()))?;
        let usage = if is_ca(tbs)? {
            KeyUsage::Ca
        } else {
            KeyUsage::Leaf
        };

        Ok(Self {
            serial: hex::encode(tbs.serial_number.as_bytes()),
            not_before: codec::from_x509_time(&tbs.validity.not_before)?,
            not_after: codec::from_x509_time(&tbs.validity.not_after)?,
            subject,
            issuer,
            usage,
            inner,
            der,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    pub fn to_pem(&self) -> CaResult<String> {
        codec::pem_encode(CERTIFICATE_LABEL, &self.der)
    }

    /// The parsed X.509 structure.
    pub fn x509(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    pub(crate) fn subject_name(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    /// Hex serial number, unique per issuing CA.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Subject common name: the certified identity.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// The certified public key.
    pub fn public_key(&self) -> CaResult<PublicKey> {
        let spki = self.inner.tbs_certificate.subject_public_key_info.to_der()?;
        Ok(PublicKey::from_der(&spki)?)
    }

    /// Checks the signature over the to-be-signed portion.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> CaResult<()> {
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|_| CaError::CertificateExpiredOrInvalid)?;
        issuer_key
            .verify(&tbs, self.inner.signature.raw_bytes())
            .map_err(|_| CaError::CertificateExpiredOrInvalid)
    }

    /// Checks that `at` falls inside the validity window (both ends inclusive).
    pub fn check_validity(&self, at: DateTime<Utc>) -> CaResult<()> {
        if at < self.not_before || at > self.not_after {
            return Err(CaError::CertificateExpiredOrInvalid);
        }
        Ok(())
    }

    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }
}

fn is_ca(tbs: &TbsCertificate) -> CaResult<bool> {
    let Some(extensions) = &tbs.extensions else {
        return Ok(false);
    };
    match extensions
        .iter()
        .find(|ext| ext.extn_id == ID_CE_BASIC_CONSTRAINTS)
    {
        Some(ext) => Ok(BasicConstraints::from_der(ext.extn_value.as_bytes())?.ca),
        None => Ok(false),
    }
}
