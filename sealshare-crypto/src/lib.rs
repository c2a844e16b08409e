//! Encryption layer for SealShare.
//!
//! Provides client-side envelope encryption using:
//! - AES-256-GCM for authenticated encryption of file bodies
//! - RSA-OAEP (SHA-256) for wrapping per-file content keys
//! - RSA-PSS (SHA-256) signatures for certificates and signing requests
//! - Secure key handling with zeroization
//!
//! # Architecture
//!
//! Every file body is encrypted exactly once:
//!
//! 1. **Content Key**: A random 256-bit key generated for each file.
//!    It never leaves memory unwrapped and is zeroized on drop.
//!
//! 2. **Wrapped Key**: The content key encrypted under one recipient's
//!    RSA public key. A file has one wrapped key per authorized identity.
//!
//! Sharing a file therefore only means unwrapping the content key with the
//! holder's private key and wrapping it again for the recipient; the
//! ciphertext itself is never touched.

pub mod algorithm;
pub mod cipher;
pub mod encoding;
mod error;
pub mod keypair;
pub mod kms;
pub mod metadata;
pub mod wrap;

pub use algorithm::{ContentCipher, KeyWrapAlgorithm, SignatureAlgorithm};
pub use cipher::{
    decrypt, encrypt, generate_content_key, open_content, random_nonce, seal_content, AuthTag,
    ContentKey, Nonce, SealedContent, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use keypair::{
    generate_keypair, KeyPair, PrivateKey, PublicKey, DEFAULT_KEY_BITS, MIN_KEY_BITS,
};
pub use kms::{TrustProfile, TrustedKms};
pub use metadata::{AccessKind, AssociatedData, EncryptionMetadata, WrappedKeyRecord};
pub use wrap::{unwrap, wrap, WrappedKey};
