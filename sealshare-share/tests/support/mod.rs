//! Shared fixtures for sharing tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sealshare_crypto::{
    generate_keypair, EncryptionMetadata, KeyPair, WrappedKeyRecord, MIN_KEY_BITS,
};
use sealshare_pki::{
    CaConfig, Certificate, CertificateAuthority, CertificateRequest, MemoryCaStore,
};
use sealshare_registry::{FileKeys, KeyRegistry, RegistryError, RegistryResult};
use sealshare_share::{CertificateDirectory, DirectoryError, MemoryCertificateDirectory};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub static ALICE: LazyLock<KeyPair> = LazyLock::new(|| generate_keypair(MIN_KEY_BITS).unwrap());
pub static BOB: LazyLock<KeyPair> = LazyLock::new(|| generate_keypair(MIN_KEY_BITS).unwrap());
pub static CAROL: LazyLock<KeyPair> = LazyLock::new(|| generate_keypair(MIN_KEY_BITS).unwrap());

pub fn test_ca_config() -> CaConfig {
    CaConfig {
        root_key_bits: MIN_KEY_BITS,
        ..CaConfig::default()
    }
}

pub fn memory_ca(config: CaConfig) -> CertificateAuthority {
    CertificateAuthority::activate(Arc::new(MemoryCaStore::new()), config).unwrap()
}

pub fn enroll(
    ca: &CertificateAuthority,
    directory: &MemoryCertificateDirectory,
    identity: &str,
    keypair: &KeyPair,
) -> Certificate {
    let csr = CertificateRequest::generate(identity, keypair).unwrap();
    let cert = ca.issue_certificate(&csr).unwrap();
    directory.publish(cert.clone());
    cert
}

/// Registry wrapper that fails the first `failures` calls to `get` and
/// `put` with `Unavailable`, and counts calls.
pub struct FlakyRegistry {
    inner: Arc<dyn KeyRegistry>,
    failures: AtomicU32,
    pub get_calls: AtomicU32,
    pub put_calls: AtomicU32,
}

impl FlakyRegistry {
    pub fn new(inner: Arc<dyn KeyRegistry>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            get_calls: AtomicU32::new(0),
            put_calls: AtomicU32::new(0),
        }
    }

    fn maybe_fail(&self) -> RegistryResult<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(RegistryError::Unavailable("injected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyRegistry for FlakyRegistry {
    async fn register_file(
        &self,
        file_id: &str,
        metadata: &EncryptionMetadata,
        owner_record: &WrappedKeyRecord,
    ) -> RegistryResult<()> {
        self.inner.register_file(file_id, metadata, owner_record).await
    }

    async fn put(&self, record: &WrappedKeyRecord) -> RegistryResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        self.inner.put(record).await
    }

    async fn get(&self, file_id: &str, identity: &str) -> RegistryResult<WrappedKeyRecord> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        self.inner.get(file_id, identity).await
    }

    async fn delete(&self, file_id: &str, identity: &str) -> RegistryResult<bool> {
        self.inner.delete(file_id, identity).await
    }

    async fn delete_file(&self, file_id: &str) -> RegistryResult<usize> {
        self.inner.delete_file(file_id).await
    }

    async fn get_metadata(&self, file_id: &str) -> RegistryResult<EncryptionMetadata> {
        self.inner.get_metadata(file_id).await
    }

    async fn list(&self, file_id: &str) -> RegistryResult<FileKeys> {
        self.inner.list(file_id).await
    }

    async fn close(&self) -> RegistryResult<()> {
        self.inner.close().await
    }
}

/// Directory that answers after a fixed delay.
pub struct SlowDirectory {
    pub inner: Arc<MemoryCertificateDirectory>,
    pub delay: Duration,
}

#[async_trait]
impl CertificateDirectory for SlowDirectory {
    async fn certificate(&self, identity: &str) -> Result<Certificate, DirectoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.certificate(identity).await
    }
}

/// Directory that is unreachable for the first `failures` lookups.
pub struct FlakyDirectory {
    pub inner: Arc<MemoryCertificateDirectory>,
    pub failures: AtomicU32,
    pub calls: AtomicU32,
}

#[async_trait]
impl CertificateDirectory for FlakyDirectory {
    async fn certificate(&self, identity: &str) -> Result<Certificate, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(DirectoryError::Unavailable("CA offline".into()));
        }
        self.inner.certificate(identity).await
    }
}
