//! The certificate authority.
//!
//! Owns the root key pair and issues leaf certificates binding identities
//! to their RSA public keys. The root is created on first activation and
//! reloaded afterwards; damaged root material is reported, never replaced.

use crate::anchor::TrustAnchor;
use crate::certificate::{Certificate, CertificateTemplate, KeyUsage};
use crate::codec;
use crate::error::{CaError, CaResult};
use crate::policy::{AllowAll, IssuancePolicy};
use crate::request::CertificateRequest;
use crate::store::{CaStore, FileCaStore, MemoryCaStore, RootMaterial};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sealshare_crypto::{generate_keypair, KeyPair, PrivateKey, PublicKey, MIN_KEY_BITS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const MAX_SUBJECT_LEN: usize = 255;
const SERIAL_BYTES: usize = 16;
const SERIAL_ATTEMPTS: usize = 8;

/// Longest validity period the CA will put in a certificate (100 years).
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

/// Certificate authority settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    pub root_subject: String,
    pub root_key_bits: usize,
    pub root_validity_days: u32,
    pub leaf_validity_days: u32,
    /// Smallest identity key the CA will certify.
    pub min_key_bits: usize,
    /// Directory for root material. `None` keeps the CA in memory.
    pub store_dir: Option<PathBuf>,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            root_subject: "SealShare Root CA".into(),
            root_key_bits: 3072,
            root_validity_days: 3650,
            leaf_validity_days: 365,
            min_key_bits: MIN_KEY_BITS,
            store_dir: None,
        }
    }
}

impl CaConfig {
    /// Rejects settings the CA cannot honor. Leaf validity may be zero
    /// (certificates valid for the issuing second only); root validity may not.
    pub fn validate(&self) -> CaResult<()> {
        validate_subject(&self.root_subject)
            .map_err(|_| CaError::Config(format!("invalid root_subject '{}'", self.root_subject)))?;

        for (name, bits) in [
            ("root_key_bits", self.root_key_bits),
            ("min_key_bits", self.min_key_bits),
        ] {
            if bits < MIN_KEY_BITS {
                return Err(CaError::Config(format!(
                    "{name} is {bits}, minimum is {MIN_KEY_BITS}"
                )));
            }
        }

        if self.root_validity_days == 0 {
            return Err(CaError::Config("root_validity_days must be > 0".into()));
        }
        for (name, days) in [
            ("root_validity_days", self.root_validity_days),
            ("leaf_validity_days", self.leaf_validity_days),
        ] {
            if days > MAX_VALIDITY_DAYS {
                return Err(CaError::Config(format!(
                    "{name} is {days}, maximum is {MAX_VALIDITY_DAYS}"
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a CA store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    /// No root material has been persisted yet.
    Uninitialized,
    /// Root material is present.
    Ready,
}

impl CaState {
    /// Reports whether `store` already holds a root. Does not validate it;
    /// [`CertificateAuthority::activate`] does.
    pub fn inspect(store: &dyn CaStore) -> CaResult<Self> {
        Ok(match store.load_root()? {
            Some(_) => CaState::Ready,
            None => CaState::Uninitialized,
        })
    }
}

pub struct CertificateAuthority {
    config: CaConfig,
    store: Arc<dyn CaStore>,
    root_key: PrivateKey,
    anchor: TrustAnchor,
    policy: Arc<dyn IssuancePolicy>,
    serial_lock: Mutex<()>,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("subject", &self.config.root_subject)
            .field("serial", &self.anchor.certificate().serial())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Brings the CA to `Ready`: loads the persisted root, or creates and
    /// persists one when the store is empty.
    pub fn activate(store: Arc<dyn CaStore>, config: CaConfig) -> CaResult<Self> {
        config.validate()?;

        let (root_key, root_cert) = match store.load_root()? {
            Some(material) => {
                let loaded = load_root(&material)?;
                info!(
                    "Loaded CA root '{}' (serial {})",
                    loaded.1.subject(),
                    loaded.1.serial()
                );
                loaded
            }
            None => {
                let created = create_root(store.as_ref(), &config)?;
                info!(
                    "Created CA root '{}' (serial {})",
                    created.1.subject(),
                    created.1.serial()
                );
                created
            }
        };

        if root_cert.not_after() < Utc::now() {
            warn!("CA root certificate expired at {}", root_cert.not_after());
        }

        let anchor = TrustAnchor::from_certificate(root_cert)
            .map_err(|_| CaError::CorruptRootMaterial("root certificate does not verify".into()))?;

        Ok(Self {
            config,
            store,
            root_key,
            anchor,
            policy: Arc::new(AllowAll),
            serial_lock: Mutex::new(()),
        })
    }

    /// Activates with the store named by `config.store_dir`, or an in-memory
    /// store when unset.
    pub fn from_config(config: CaConfig) -> CaResult<Self> {
        let store: Arc<dyn CaStore> = match &config.store_dir {
            Some(dir) => Arc::new(FileCaStore::new(dir)),
            None => Arc::new(MemoryCaStore::new()),
        };
        Self::activate(store, config)
    }

    /// Replaces the issuance policy (default: [`AllowAll`]).
    pub fn with_policy(mut self, policy: Arc<dyn IssuancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    /// The CA certificate, for clients to anchor trust.
    pub fn ca_certificate(&self) -> &Certificate {
        self.anchor.certificate()
    }

    pub fn ca_certificate_pem(&self) -> CaResult<String> {
        self.anchor.certificate().to_pem()
    }

    pub fn trust_anchor(&self) -> TrustAnchor {
        self.anchor.clone()
    }

    /// Certifies the key in `request` for its subject.
    pub fn issue_certificate(&self, request: &CertificateRequest) -> CaResult<Certificate> {
        let public_key = request.verify_self_signature()?;
        let subject = request.subject();

        validate_subject(subject)?;
        if public_key.bits() < self.config.min_key_bits {
            return Err(CaError::CertificateRejected(format!(
                "key is {} bits, minimum is {}",
                public_key.bits(),
                self.config.min_key_bits
            )));
        }
        self.policy
            .authorize(subject, &public_key)
            .map_err(CaError::CertificateRejected)?;

        let serial = self.allocate_serial()?;
        let (not_before, not_after) = validity_window(Utc::now(), self.config.leaf_validity_days)?;
        let certificate = Certificate::issue_leaf(
            CertificateTemplate {
                serial: &serial,
                subject,
                subject_key: &public_key,
                not_before,
                not_after,
            },
            self.anchor.certificate(),
            &self.root_key,
        )?;

        info!(
            "Issued certificate serial={} subject={}",
            certificate.serial(),
            certificate.subject()
        );
        Ok(certificate)
    }

    /// PKCS#10 PEM in, X.509 PEM out. Undecodable requests are rejected.
    pub fn issue_pem(&self, request_pem: &str) -> CaResult<String> {
        let request = CertificateRequest::from_pem(request_pem).map_err(|e| match e {
            CaError::Malformed(reason) => CaError::CertificateRejected(reason),
            CaError::Crypto(e) => CaError::CertificateRejected(e.to_string()),
            other => other,
        })?;
        self.issue_certificate(&request)?.to_pem()
    }

    pub fn verify(&self, certificate: &Certificate) -> CaResult<()> {
        self.verify_at(certificate, Utc::now())
    }

    pub fn verify_at(&self, certificate: &Certificate, at: DateTime<Utc>) -> CaResult<()> {
        self.anchor.verify_at(certificate, at).map(|_| ())
    }

    fn allocate_serial(&self) -> CaResult<[u8; SERIAL_BYTES]> {
        let _guard = self
            .serial_lock
            .lock()
            .map_err(|e| CaError::Storage(format!("serial lock poisoned: {e}")))?;
        next_serial(self.store.as_ref())
    }
}

/// Draws a random positive serial and records it. The first byte is kept in
/// `0x01..=0x7f` so the DER INTEGER is positive and minimally encoded.
fn next_serial(store: &dyn CaStore) -> CaResult<[u8; SERIAL_BYTES]> {
    for _ in 0..SERIAL_ATTEMPTS {
        let mut bytes = [0u8; SERIAL_BYTES];
        OsRng.fill_bytes(&mut bytes);
        bytes[0] = (bytes[0] & 0x7f).max(1);
        if store.record_serial(&hex::encode(bytes))? {
            return Ok(bytes);
        }
        debug!("Serial collision, drawing again");
    }
    Err(CaError::Storage("could not allocate a unique serial".into()))
}

/// `[now, now + days]`, truncated to whole seconds.
fn validity_window(now: DateTime<Utc>, days: u32) -> CaResult<(DateTime<Utc>, DateTime<Utc>)> {
    let not_before = codec::whole_seconds(now);
    let not_after = Duration::try_days(i64::from(days))
        .and_then(|span| not_before.checked_add_signed(span))
        .ok_or_else(|| {
            CaError::ValidityOutOfRange(format!("{days} days after {not_before}"))
        })?;
    Ok((not_before, not_after))
}

fn validate_subject(subject: &str) -> CaResult<()> {
    if subject.trim().is_empty() {
        return Err(CaError::CertificateRejected("subject is empty".into()));
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(CaError::CertificateRejected(format!(
            "subject exceeds {MAX_SUBJECT_LEN} bytes"
        )));
    }
    if subject.chars().any(char::is_control) {
        return Err(CaError::CertificateRejected(
            "subject contains control characters".into(),
        ));
    }
    Ok(())
}

fn create_root(store: &dyn CaStore, config: &CaConfig) -> CaResult<(PrivateKey, Certificate)> {
    let KeyPair { public, private } = generate_keypair(config.root_key_bits)?;
    let (not_before, not_after) = validity_window(Utc::now(), config.root_validity_days)?;
    let serial = next_serial(store)?;
    let certificate = Certificate::self_signed_root(
        CertificateTemplate {
            serial: &serial,
            subject: &config.root_subject,
            subject_key: &public,
            not_before,
            not_after,
        },
        &private,
    )?;

    store.save_root(&RootMaterial {
        private_key_pem: private.to_pkcs8_pem()?,
        certificate_pem: certificate.to_pem()?,
    })?;
    Ok((private, certificate))
}

fn load_root(material: &RootMaterial) -> CaResult<(PrivateKey, Certificate)> {
    let private = PrivateKey::from_pkcs8_pem(&material.private_key_pem)
        .map_err(|e| CaError::CorruptRootMaterial(format!("root key: {e}")))?;
    let certificate = Certificate::from_pem(&material.certificate_pem)
        .map_err(|e| CaError::CorruptRootMaterial(format!("root certificate: {e}")))?;

    let certified: PublicKey = certificate
        .public_key()
        .map_err(|e| CaError::CorruptRootMaterial(format!("root certificate key: {e}")))?;
    if certified != private.public_key() {
        return Err(CaError::CorruptRootMaterial(
            "root key does not match root certificate".into(),
        ));
    }
    if certificate.usage() != KeyUsage::Ca {
        return Err(CaError::CorruptRootMaterial(
            "root certificate is not a CA certificate".into(),
        ));
    }
    Ok((private, certificate))
}
