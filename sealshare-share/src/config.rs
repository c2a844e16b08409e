//! SealShare configuration.

use crate::error::{ShareError, ShareResult};
use crate::retry::RetryPolicy;
use sealshare_crypto::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use sealshare_pki::CaConfig;
use sealshare_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Key generation settings for identities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Modulus size for newly generated identity key pairs.
    pub user_key_bits: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            user_key_bits: DEFAULT_KEY_BITS,
        }
    }
}

/// Top-level configuration. Every section falls back to its defaults when
/// omitted from the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealShareConfig {
    pub crypto: CryptoConfig,
    pub ca: CaConfig,
    pub registry: RegistryConfig,
    pub retry: RetryPolicy,
    /// Upper bound for one share operation, in milliseconds.
    pub share_timeout_ms: u64,
}

impl Default for SealShareConfig {
    fn default() -> Self {
        Self {
            crypto: CryptoConfig::default(),
            ca: CaConfig::default(),
            registry: RegistryConfig::default(),
            retry: RetryPolicy::default(),
            share_timeout_ms: 10_000,
        }
    }
}

impl SealShareConfig {
    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ShareResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn share_timeout(&self) -> Duration {
        Duration::from_millis(self.share_timeout_ms)
    }

    pub fn validate(&self) -> ShareResult<()> {
        self.ca
            .validate()
            .map_err(|e| ShareError::Config(format!("ca: {e}")))?;
        if self.crypto.user_key_bits < MIN_KEY_BITS {
            return Err(ShareError::Config(format!(
                "crypto.user_key_bits is {}, minimum is {MIN_KEY_BITS}",
                self.crypto.user_key_bits
            )));
        }
        if self.crypto.user_key_bits < self.ca.min_key_bits {
            return Err(ShareError::Config(
                "crypto.user_key_bits is below ca.min_key_bits".into(),
            ));
        }
        if self.ca.leaf_validity_days == 0 {
            return Err(ShareError::Config("ca.leaf_validity_days must be > 0".into()));
        }
        if self.ca.root_validity_days < self.ca.leaf_validity_days {
            return Err(ShareError::Config(
                "ca.root_validity_days is shorter than ca.leaf_validity_days".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ShareError::Config("retry.max_attempts must be >= 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ShareError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if self.share_timeout_ms == 0 {
            return Err(ShareError::Config("share_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}
