//! End-to-end sealing, opening and sharing.

mod support;

use pretty_assertions::assert_eq;
use sealshare_crypto::{AccessKind, CryptoError};
use sealshare_pki::{CaConfig, CaError};
use sealshare_registry::{KeyRegistry, MemoryKeyRegistry, RegistryError};
use sealshare_share::{
    DirectoryError, MemoryCertificateDirectory, RetryPolicy, ShareError, ShareRequest,
    ShareService,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use tokio::task::JoinSet;

struct Fixture {
    ca: sealshare_pki::CertificateAuthority,
    directory: Arc<MemoryCertificateDirectory>,
    registry: Arc<dyn KeyRegistry>,
    service: ShareService,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn fixture() -> Fixture {
    let ca = memory_ca(test_ca_config());
    let directory = Arc::new(MemoryCertificateDirectory::new());
    let registry: Arc<dyn KeyRegistry> = Arc::new(MemoryKeyRegistry::new());
    enroll(&ca, &directory, "alice", &ALICE);
    enroll(&ca, &directory, "bob", &BOB);

    let service = ShareService::new(registry.clone(), directory.clone(), ca.trust_anchor())
        .with_retry(fast_retry());
    Fixture {
        ca,
        directory,
        registry,
        service,
    }
}

// ── Hello world ──────────────────────────────────────────────────

#[tokio::test]
async fn alice_shares_hello_world_with_bob() {
    let fx = fixture();

    let sealed = fx
        .service
        .seal_file("greeting", "alice", &ALICE.public, b"hello world")
        .await
        .unwrap();
    assert_ne!(sealed.ciphertext, b"hello world");

    // Bob holds no key yet.
    let err = fx
        .service
        .open_file("greeting", "bob", &BOB.private, &sealed.ciphertext)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShareError::Registry(RegistryError::KeyNotFound { .. })
    ));

    fx.service
        .share(
            &ShareRequest::new("greeting", "alice", "bob", AccessKind::Read),
            &ALICE.private,
        )
        .await
        .unwrap();

    let plaintext = fx
        .service
        .open_file("greeting", "bob", &BOB.private, &sealed.ciphertext)
        .await
        .unwrap();
    assert_eq!(plaintext, b"hello world");

    let owner = fx
        .service
        .open_file("greeting", "alice", &ALICE.private, &sealed.ciphertext)
        .await
        .unwrap();
    assert_eq!(owner, b"hello world");
}

#[tokio::test]
async fn recipient_can_reshare() {
    let fx = fixture();
    enroll(&fx.ca, &fx.directory, "carol", &CAROL);

    let sealed = fx
        .service
        .seal_file("doc", "alice", &ALICE.public, b"chain")
        .await
        .unwrap();
    fx.service
        .share(&ShareRequest::new("doc", "alice", "bob", AccessKind::Write), &ALICE.private)
        .await
        .unwrap();
    fx.service
        .share(&ShareRequest::new("doc", "bob", "carol", AccessKind::Read), &BOB.private)
        .await
        .unwrap();

    let plaintext = fx
        .service
        .open_file("doc", "carol", &CAROL.private, &sealed.ciphertext)
        .await
        .unwrap();
    assert_eq!(plaintext, b"chain");
}

#[tokio::test]
async fn seal_file_for_verified_certificate() {
    let fx = fixture();
    let cert = enroll(&fx.ca, &fx.directory, "carol", &CAROL);

    let sealed = fx
        .service
        .seal_file_for("carol-notes", &cert, b"mine")
        .await
        .unwrap();
    let keys = fx.service.list("carol-notes").await.unwrap();
    assert_eq!(keys.records.len(), 1);
    assert_eq!(keys.records[0].identity, "carol");
    assert_eq!(keys.records[0].access, AccessKind::Write);
    assert_eq!(keys.metadata, sealed.metadata);
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn sharing_twice_leaves_one_record() {
    let fx = fixture();
    let sealed = fx
        .service
        .seal_file("f", "alice", &ALICE.public, b"twice")
        .await
        .unwrap();

    let request = ShareRequest::new("f", "alice", "bob", AccessKind::Read);
    fx.service.share(&request, &ALICE.private).await.unwrap();
    fx.service.share(&request, &ALICE.private).await.unwrap();

    let keys = fx.service.list("f").await.unwrap();
    assert_eq!(keys.records.len(), 2);
    let plaintext = fx
        .service
        .open_file("f", "bob", &BOB.private, &sealed.ciphertext)
        .await
        .unwrap();
    assert_eq!(plaintext, b"twice");
}

#[tokio::test]
async fn sharing_with_oneself_keeps_existing_access() {
    let fx = fixture();
    fx.service
        .seal_file("mine", "alice", &ALICE.public, b"owned")
        .await
        .unwrap();
    let before = fx.registry.get("mine", "alice").await.unwrap();

    let err = fx
        .service
        .share(
            &ShareRequest::new("mine", "alice", "alice", AccessKind::Read),
            &ALICE.private,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::InvalidRequest(_)));

    let after = fx.registry.get("mine", "alice").await.unwrap();
    assert_eq!(after.access, AccessKind::Write);
    assert_eq!(after, before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_shares_and_opens_see_whole_records() {
    let Fixture { service, .. } = fixture();
    let service = Arc::new(service);
    let sealed = service
        .seal_file("race", "alice", &ALICE.public, b"contended")
        .await
        .unwrap();
    service
        .share(&ShareRequest::new("race", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap();

    let mut tasks: JoinSet<Result<(), ShareError>> = JoinSet::new();
    for i in 0..12 {
        let service = service.clone();
        let access = if i % 2 == 0 { AccessKind::Read } else { AccessKind::Write };
        tasks.spawn(async move {
            let request = ShareRequest::new("race", "alice", "bob", access);
            service.share(&request, &ALICE.private).await.map(|_| ())
        });
    }
    for _ in 0..12 {
        let service = service.clone();
        let ciphertext = sealed.ciphertext.clone();
        tasks.spawn(async move {
            let plaintext = service
                .open_file("race", "bob", &BOB.private, &ciphertext)
                .await?;
            assert_eq!(plaintext, b"contended");
            Ok(())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let keys = service.list("race").await.unwrap();
    assert_eq!(keys.records.len(), 2);
    assert_eq!(keys.records.iter().filter(|r| r.identity == "bob").count(), 1);
}

// ── Failures write nothing ───────────────────────────────────────

#[tokio::test]
async fn unknown_recipient_fails_without_writing() {
    let fx = fixture();
    fx.service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();

    let err = fx
        .service
        .share(&ShareRequest::new("f", "alice", "mallory", AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::Directory(DirectoryError::NotFound(_))));
    assert!(fx.registry.get("f", "mallory").await.is_err());
}

#[tokio::test]
async fn certificate_from_foreign_ca_is_refused() {
    let fx = fixture();
    let rogue = memory_ca(test_ca_config());
    enroll(&rogue, &fx.directory, "mallory", &CAROL);
    fx.service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();

    let err = fx
        .service
        .share(&ShareRequest::new("f", "alice", "mallory", AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShareError::Certificate(CaError::CertificateExpiredOrInvalid)
    ));
    assert!(fx.registry.get("f", "mallory").await.is_err());
}

#[tokio::test]
async fn expired_recipient_certificate_is_refused() {
    let fx = fixture();
    let short_lived = memory_ca(CaConfig {
        leaf_validity_days: 0,
        ..test_ca_config()
    });
    let directory = Arc::new(MemoryCertificateDirectory::new());
    enroll(&short_lived, &directory, "bob", &BOB);
    let service = ShareService::new(fx.registry.clone(), directory, short_lived.trust_anchor());

    service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let err = service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShareError::Certificate(CaError::CertificateExpiredOrInvalid)
    ));
}

#[tokio::test]
async fn ca_certificate_is_not_a_recipient() {
    let fx = fixture();
    fx.directory.publish(fx.ca.ca_certificate().clone());
    fx.service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();

    let root = fx.ca.ca_certificate().subject().to_string();
    let err = fx
        .service
        .share(&ShareRequest::new("f", "alice", &root, AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::Certificate(_)));
}

#[tokio::test]
async fn sender_without_key_cannot_share() {
    let fx = fixture();
    fx.service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();

    let err = fx
        .service
        .share(&ShareRequest::new("f", "bob", "alice", AccessKind::Read), &BOB.private)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShareError::Registry(RegistryError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn wrong_private_key_is_wrap_failure_and_not_retried() {
    let ca = memory_ca(test_ca_config());
    let directory = Arc::new(MemoryCertificateDirectory::new());
    enroll(&ca, &directory, "bob", &BOB);
    let flaky = Arc::new(FlakyRegistry::new(Arc::new(MemoryKeyRegistry::new()), 0));
    let service = ShareService::new(flaky.clone(), directory, ca.trust_anchor())
        .with_retry(fast_retry());

    service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    let err = service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &CAROL.private)
        .await
        .unwrap_err();

    assert!(matches!(err, ShareError::Crypto(CryptoError::WrapFailure)));
    assert!(!err.is_transient());
    assert_eq!(flaky.get_calls.load(Ordering::SeqCst), 1);
    assert_eq!(flaky.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tampered_ciphertext_fails_authentication() {
    let fx = fixture();
    let mut sealed = fx
        .service
        .seal_file("f", "alice", &ALICE.public, b"integrity matters")
        .await
        .unwrap();
    sealed.ciphertext[0] ^= 0x80;

    let err = fx
        .service
        .open_file("f", "alice", &ALICE.private, &sealed.ciphertext)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShareError::Crypto(CryptoError::AuthenticationFailure)
    ));
}

#[tokio::test]
async fn ciphertext_is_bound_to_its_file_id() {
    let fx = fixture();
    let first = fx
        .service
        .seal_file("one", "alice", &ALICE.public, b"same")
        .await
        .unwrap();
    fx.service
        .seal_file("two", "alice", &ALICE.public, b"same")
        .await
        .unwrap();

    // Ciphertext of "one" presented as "two" is rejected.
    assert!(fx
        .service
        .open_file("two", "alice", &ALICE.private, &first.ciphertext)
        .await
        .is_err());
}

// ── Timeouts ─────────────────────────────────────────────────────

#[tokio::test]
async fn slow_directory_times_out_without_writing() {
    let fx = fixture();
    let slow = Arc::new(SlowDirectory {
        inner: fx.directory.clone(),
        delay: Duration::from_secs(5),
    });
    let service = ShareService::new(fx.registry.clone(), slow, fx.ca.trust_anchor())
        .with_timeout(Duration::from_millis(50));

    service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    let err = service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();

    assert!(matches!(err, ShareError::Timeout(_)));
    assert!(fx.registry.get("f", "bob").await.is_err());
}

// ── Retries ──────────────────────────────────────────────────────

#[tokio::test]
async fn transient_registry_failures_are_retried() {
    let ca = memory_ca(test_ca_config());
    let directory = Arc::new(MemoryCertificateDirectory::new());
    enroll(&ca, &directory, "bob", &BOB);
    let flaky = Arc::new(FlakyRegistry::new(Arc::new(MemoryKeyRegistry::new()), 2));
    let service = ShareService::new(flaky.clone(), directory, ca.trust_anchor())
        .with_retry(fast_retry());

    let sealed = service
        .seal_file("f", "alice", &ALICE.public, b"eventually")
        .await
        .unwrap();
    service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap();

    assert_eq!(flaky.get_calls.load(Ordering::SeqCst), 3);
    let plaintext = service
        .open_file("f", "bob", &BOB.private, &sealed.ciphertext)
        .await
        .unwrap();
    assert_eq!(plaintext, b"eventually");
}

#[tokio::test]
async fn unavailable_directory_is_retried_then_reported() {
    let ca = memory_ca(test_ca_config());
    let inner = Arc::new(MemoryCertificateDirectory::new());
    enroll(&ca, &inner, "bob", &BOB);
    let directory = Arc::new(FlakyDirectory {
        inner,
        failures: AtomicU32::new(10),
        calls: AtomicU32::new(0),
    });
    let registry: Arc<dyn KeyRegistry> = Arc::new(MemoryKeyRegistry::new());
    let service = ShareService::new(registry.clone(), directory.clone(), ca.trust_anchor())
        .with_retry(fast_retry());

    service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    let err = service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShareError::Directory(DirectoryError::Unavailable(_))
    ));
    assert!(err.is_transient());
    assert_eq!(directory.calls.load(Ordering::SeqCst), 3);
    assert!(registry.get("f", "bob").await.is_err());
}

// ── Revocation of access ─────────────────────────────────────────

#[tokio::test]
async fn removed_identity_can_no_longer_open() {
    let fx = fixture();
    let sealed = fx
        .service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    fx.service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap();

    assert!(fx.service.remove_access("f", "bob").await.unwrap());
    assert!(!fx.service.remove_access("f", "bob").await.unwrap());
    assert!(fx
        .service
        .open_file("f", "bob", &BOB.private, &sealed.ciphertext)
        .await
        .is_err());
}

#[tokio::test]
async fn deleted_file_has_no_keys() {
    let fx = fixture();
    fx.service
        .seal_file("f", "alice", &ALICE.public, b"x")
        .await
        .unwrap();
    fx.service
        .share(&ShareRequest::new("f", "alice", "bob", AccessKind::Read), &ALICE.private)
        .await
        .unwrap();

    assert_eq!(fx.service.delete_file("f").await.unwrap(), 2);
    assert!(matches!(
        fx.service.list("f").await,
        Err(ShareError::Registry(RegistryError::MetadataMissing(_)))
    ));
}
