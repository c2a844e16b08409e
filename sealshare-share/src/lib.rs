//! Key sharing for SealShare.
//!
//! Provides:
//! - [`ShareService`]: seal, open and share files through the key registry
//! - [`CertificateDirectory`]: recipient certificate lookup, verified
//!   against the CA trust anchor before use
//! - Bounded retries for transient registry and directory failures
//! - [`SealShareConfig`] and tracing setup
//! - [`SealShare`]: all of the above assembled from one configuration

pub mod config;
pub mod directory;
mod error;
pub mod logging;
pub mod node;
pub mod retry;
pub mod service;
pub mod types;

pub use config::{CryptoConfig, SealShareConfig};
pub use directory::{CertificateDirectory, MemoryCertificateDirectory};
pub use error::{DirectoryError, ShareError, ShareResult};
pub use node::SealShare;
pub use retry::RetryPolicy;
pub use service::ShareService;
pub use types::{new_file_id, SealedFile, ShareRequest};
