//! Sealing, opening and sharing files.
//!
//! Sharing never touches the ciphertext. The sender unwraps the file's
//! content key with their private key and wraps it again for the
//! recipient's certified public key; the registry upsert is the only write.

use crate::config::SealShareConfig;
use crate::directory::CertificateDirectory;
use crate::error::{ShareError, ShareResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{SealedFile, ShareRequest};
use sealshare_crypto::{
    open_content, seal_content, unwrap, wrap, AccessKind, AssociatedData, EncryptionMetadata,
    PrivateKey, PublicKey, WrappedKeyRecord,
};
use sealshare_pki::{CaError, Certificate, KeyUsage, TrustAnchor};
use sealshare_registry::{FileKeys, KeyRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Coordinates the registry, the certificate directory and the CA trust
/// anchor for all file key operations.
pub struct ShareService {
    registry: Arc<dyn KeyRegistry>,
    directory: Arc<dyn CertificateDirectory>,
    anchor: TrustAnchor,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ShareService {
    pub fn new(
        registry: Arc<dyn KeyRegistry>,
        directory: Arc<dyn CertificateDirectory>,
        anchor: TrustAnchor,
    ) -> Self {
        let defaults = SealShareConfig::default();
        Self {
            registry,
            directory,
            anchor,
            retry: defaults.retry,
            timeout: defaults.share_timeout(),
        }
    }

    /// Applies the retry policy and share timeout from `config`.
    pub fn with_config(mut self, config: &SealShareConfig) -> Self {
        self.retry = config.retry;
        self.timeout = config.share_timeout();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<dyn KeyRegistry> {
        &self.registry
    }

    /// Encrypts `plaintext` as a new file owned by `owner`, whose key is
    /// `owner_key`, and registers the owner's wrapped key.
    pub async fn seal_file(
        &self,
        file_id: &str,
        owner: &str,
        owner_key: &PublicKey,
        plaintext: &[u8],
    ) -> ShareResult<SealedFile> {
        let binding = AssociatedData::FileId;
        let (content_key, sealed) = seal_content(plaintext, binding.bytes(file_id))?;
        let metadata = EncryptionMetadata::for_sealed(&sealed, binding);
        let record = WrappedKeyRecord::new(
            file_id,
            owner,
            wrap(&content_key, owner_key)?,
            AccessKind::Write,
        );
        drop(content_key);

        with_retry(&self.retry, "register file", || {
            self.registry.register_file(file_id, &metadata, &record)
        })
        .await?;

        info!("Sealed file {} for {}", file_id, owner);
        Ok(SealedFile {
            file_id: file_id.to_string(),
            ciphertext: sealed.ciphertext,
            metadata,
        })
    }

    /// Like [`seal_file`](Self::seal_file), taking the owner's identity and
    /// key from a certificate verified against the trust anchor.
    pub async fn seal_file_for(
        &self,
        file_id: &str,
        owner: &Certificate,
        plaintext: &[u8],
    ) -> ShareResult<SealedFile> {
        let owner_key = self.verified_leaf_key(owner, owner.subject())?;
        self.seal_file(file_id, owner.subject(), &owner_key, plaintext)
            .await
    }

    /// Decrypts a file body for `identity`.
    ///
    /// Fails with `KeyNotFound` if the identity holds no key for the file
    /// and with `AuthenticationFailure` if the ciphertext was altered.
    pub async fn open_file(
        &self,
        file_id: &str,
        identity: &str,
        private_key: &PrivateKey,
        ciphertext: &[u8],
    ) -> ShareResult<Vec<u8>> {
        let record = self.fetch_record(file_id, identity).await?;
        let metadata = with_retry(&self.retry, "fetch metadata", || {
            self.registry.get_metadata(file_id)
        })
        .await?;

        let content_key = unwrap(&record.wrapped_key, private_key)?;
        let sealed = metadata.attach(ciphertext.to_vec());
        let plaintext = open_content(
            &sealed,
            &content_key,
            metadata.associated_data.bytes(file_id),
        )?;

        debug!("Opened file {} for {}", file_id, identity);
        Ok(plaintext)
    }

    /// Wraps the file's content key for `request.to`.
    ///
    /// Sharing with oneself is refused, so an identity cannot change its own
    /// access level. Bounded by the configured timeout. On timeout nothing has been
    /// written unless the final registry upsert had already completed.
    pub async fn share(
        &self,
        request: &ShareRequest,
        from_private_key: &PrivateKey,
    ) -> ShareResult<WrappedKeyRecord> {
        tokio::time::timeout(self.timeout, self.share_inner(request, from_private_key))
            .await
            .map_err(|_| ShareError::Timeout(self.timeout))?
    }

    async fn share_inner(
        &self,
        request: &ShareRequest,
        from_private_key: &PrivateKey,
    ) -> ShareResult<WrappedKeyRecord> {
        if request.to == request.from {
            return Err(ShareError::InvalidRequest(format!(
                "'{}' cannot share a file with itself",
                request.from
            )));
        }
        let recipient_key = self.resolve_recipient(&request.to).await?;
        let sender = self.fetch_record(&request.file_id, &request.from).await?;

        let content_key = unwrap(&sender.wrapped_key, from_private_key)?;
        let wrapped = wrap(&content_key, &recipient_key)?;
        drop(content_key);

        let record = WrappedKeyRecord::new(&request.file_id, &request.to, wrapped, request.access);
        with_retry(&self.retry, "store wrapped key", || self.registry.put(&record)).await?;

        info!(
            "Shared file {} from {} to {} ({})",
            request.file_id, request.from, request.to, request.access
        );
        Ok(record)
    }

    /// Removes one identity's wrapped key. Returns whether one existed.
    ///
    /// This stops future key fetches only; anyone who already unwrapped the
    /// content key keeps it until the file is re-sealed under a new key.
    pub async fn remove_access(&self, file_id: &str, identity: &str) -> ShareResult<bool> {
        let removed = with_retry(&self.retry, "remove access", || {
            self.registry.delete(file_id, identity)
        })
        .await?;
        if removed {
            info!("Removed access to {} for {}", file_id, identity);
        }
        Ok(removed)
    }

    /// Removes the file's metadata and every wrapped key.
    pub async fn delete_file(&self, file_id: &str) -> ShareResult<usize> {
        let removed =
            with_retry(&self.retry, "delete file", || self.registry.delete_file(file_id)).await?;
        info!("Deleted file {} ({} keys)", file_id, removed);
        Ok(removed)
    }

    pub async fn list(&self, file_id: &str) -> ShareResult<FileKeys> {
        Ok(with_retry(&self.retry, "list keys", || self.registry.list(file_id)).await?)
    }

    async fn fetch_record(&self, file_id: &str, identity: &str) -> ShareResult<WrappedKeyRecord> {
        Ok(with_retry(&self.retry, "fetch wrapped key", || {
            self.registry.get(file_id, identity)
        })
        .await?)
    }

    async fn resolve_recipient(&self, identity: &str) -> ShareResult<PublicKey> {
        let certificate = with_retry(&self.retry, "resolve certificate", || {
            self.directory.certificate(identity)
        })
        .await?;
        self.verified_leaf_key(&certificate, identity)
    }

    /// Verifies `certificate` and checks it is a leaf issued to `identity`.
    fn verified_leaf_key(&self, certificate: &Certificate, identity: &str) -> ShareResult<PublicKey> {
        let key = self.anchor.verify(certificate)?;
        if certificate.usage() != KeyUsage::Leaf || certificate.subject() != identity {
            return Err(CaError::CertificateExpiredOrInvalid.into());
        }
        Ok(key)
    }
}
