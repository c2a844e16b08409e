//! Issuance authorization.
//!
//! The CA asks its policy before certifying any subject. Deployments plug in
//! their own identity checks; the two provided policies cover open
//! enrollment and a fixed roster.

use sealshare_crypto::PublicKey;
use std::collections::HashSet;

/// Decides whether a subject may obtain a certificate for a key.
pub trait IssuancePolicy: Send + Sync {
    /// Returns `Err(reason)` to refuse issuance.
    fn authorize(&self, subject: &str, public_key: &PublicKey) -> Result<(), String>;
}

/// Certifies every well-formed request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl IssuancePolicy for AllowAll {
    fn authorize(&self, _subject: &str, _public_key: &PublicKey) -> Result<(), String> {
        Ok(())
    }
}

/// Certifies only the listed subjects.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    subjects: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, subject: impl Into<String>) {
        self.subjects.insert(subject.into());
    }
}

impl IssuancePolicy for AllowList {
    fn authorize(&self, subject: &str, _public_key: &PublicKey) -> Result<(), String> {
        if self.subjects.contains(subject) {
            Ok(())
        } else {
            Err(format!("subject '{subject}' is not enrolled"))
        }
    }
}
