//! Certificate authority for SealShare.
//!
//! Binds identities to RSA public keys:
//! - a self-signed root created once and persisted through a [`CaStore`]
//! - leaf certificates issued from self-signed certificate requests
//! - verification against the root key, either inside the CA or on a
//!   client holding only the downloaded CA certificate ([`TrustAnchor`])
//!
//! Certificates are X.509 v3 and requests are PKCS#10, both DER encoded and
//! PEM armored for transport, so requests produced by standard tooling such
//! as `openssl req` are accepted as-is. The CA signs with RSASSA-PSS.

pub mod anchor;
pub mod authority;
pub mod certificate;
mod codec;
mod error;
pub mod policy;
pub mod request;
pub mod store;

pub use anchor::TrustAnchor;
pub use authority::{CaConfig, CaState, CertificateAuthority, MAX_VALIDITY_DAYS};
pub use certificate::{Certificate, KeyUsage};
pub use error::{CaError, CaResult};
pub use policy::{AllowAll, AllowList, IssuancePolicy};
pub use request::CertificateRequest;
pub use store::{CaStore, FileCaStore, MemoryCaStore, RootMaterial};
