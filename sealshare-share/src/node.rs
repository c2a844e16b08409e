//! A complete SealShare instance assembled from configuration.

use crate::config::SealShareConfig;
use crate::directory::MemoryCertificateDirectory;
use crate::error::ShareResult;
use crate::service::ShareService;
use sealshare_crypto::{generate_keypair, KeyPair};
use sealshare_pki::{Certificate, CertificateAuthority, CertificateRequest};
use sealshare_registry::open_registry;
use std::sync::Arc;
use tracing::info;

/// CA, certificate directory, key registry and sharing service wired
/// together.
pub struct SealShare {
    config: SealShareConfig,
    ca: CertificateAuthority,
    directory: Arc<MemoryCertificateDirectory>,
    service: ShareService,
}

impl SealShare {
    /// Validates `config`, activates the CA and opens the registry.
    pub fn open(config: SealShareConfig) -> ShareResult<Self> {
        config.validate()?;

        let ca = CertificateAuthority::from_config(config.ca.clone())?;
        let registry = open_registry(&config.registry)?;
        let directory = Arc::new(MemoryCertificateDirectory::new());
        let service = ShareService::new(registry, directory.clone(), ca.trust_anchor())
            .with_config(&config);

        info!("SealShare ready (CA '{}')", ca.ca_certificate().subject());
        Ok(Self {
            config,
            ca,
            directory,
            service,
        })
    }

    pub fn config(&self) -> &SealShareConfig {
        &self.config
    }

    pub fn ca(&self) -> &CertificateAuthority {
        &self.ca
    }

    pub fn directory(&self) -> &MemoryCertificateDirectory {
        &self.directory
    }

    pub fn service(&self) -> &ShareService {
        &self.service
    }

    /// Certifies `keypair` for `identity` and publishes the certificate.
    pub fn enroll(&self, identity: &str, keypair: &KeyPair) -> ShareResult<Certificate> {
        let request = CertificateRequest::generate(identity, keypair)?;
        let certificate = self.ca.issue_certificate(&request)?;
        self.directory.publish(certificate.clone());
        Ok(certificate)
    }

    /// Generates a key pair of the configured size and enrolls it.
    pub fn enroll_new(&self, identity: &str) -> ShareResult<(KeyPair, Certificate)> {
        let keypair = generate_keypair(self.config.crypto.user_key_bits)?;
        let certificate = self.enroll(identity, &keypair)?;
        Ok((keypair, certificate))
    }

    /// Releases the registry.
    pub async fn close(&self) -> ShareResult<()> {
        self.service.registry().close().await?;
        Ok(())
    }
}
