//! Witness configuration and identity

use std::{str::FromStr, sync::Arc, time::Duration};

use crate::crypto::KeyProvider;
use crate::error::WitnessError;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_ESCROW_TTL_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Behavioural settings for a witness node.
#[derive(Debug, Clone)]
pub struct WitnessConfig {
    /// Base URL this witness is reachable at, used in OOBIs
    pub public_url: String,
    /// How long an escrowed event waits for its dependencies
    pub escrow_ttl: Duration,
    /// Period of the background escrow sweep
    pub sweep_interval: Duration,
    /// Commit attempts before a transient conflict is surfaced
    pub max_commit_retries: u32,
    /// Only witness identifiers that list this witness
    pub require_designation: bool,
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            escrow_ttl: Duration::from_secs(DEFAULT_ESCROW_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            require_designation: false,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, WitnessError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WitnessError::Config(format!("{} is invalid: {}", name, e))),
        Err(_) => Ok(default),
    }
}

impl WitnessConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, WitnessError> {
        let public_url =
            std::env::var("PUBLIC_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string());
        let escrow_ttl = env_parse("ESCROW_TTL_SECS", DEFAULT_ESCROW_TTL_SECS)?;
        let sweep_interval = env_parse("ESCROW_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        let max_commit_retries = env_parse("MAX_COMMIT_RETRIES", DEFAULT_MAX_COMMIT_RETRIES)?;
        let require_designation = env_parse("WITNESS_REQUIRE_DESIGNATION", false)?;

        if max_commit_retries == 0 {
            return Err(WitnessError::Config(
                "MAX_COMMIT_RETRIES must be at least 1".to_string(),
            ));
        }
        if sweep_interval == 0 {
            return Err(WitnessError::Config(
                "ESCROW_SWEEP_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            public_url: public_url.trim_end_matches('/').to_string(),
            escrow_ttl: Duration::from_secs(escrow_ttl),
            sweep_interval: Duration::from_secs(sweep_interval),
            max_commit_retries,
            require_designation,
        })
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_escrow_ttl(mut self, ttl: Duration) -> Self {
        self.escrow_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries.max(1);
        self
    }

    pub fn with_require_designation(mut self, required: bool) -> Self {
        self.require_designation = required;
        self
    }
}

/// The witness's own signing identity. Its AID is a basic prefix: the
/// encoded public key of its provider.
#[derive(Clone)]
pub struct WitnessIdentity {
    aid: String,
    provider: Arc<dyn KeyProvider>,
}

impl WitnessIdentity {
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            aid: provider.public_key(),
            provider,
        }
    }

    pub fn aid(&self) -> &str {
        &self.aid
    }

    pub fn sign(&self, data: &[u8]) -> Result<String, WitnessError> {
        self.provider.sign(data)
    }
}

impl std::fmt::Debug for WitnessIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WitnessIdentity")
            .field("aid", &self.aid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SoftwareKeyProvider;

    #[test]
    fn test_defaults() {
        let config = WitnessConfig::default();
        assert_eq!(config.escrow_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.max_commit_retries, 3);
        assert!(!config.require_designation);
    }

    #[test]
    fn test_builders() {
        let config = WitnessConfig::default()
            .with_public_url("https://witness.example/")
            .with_max_commit_retries(0)
            .with_require_designation(true);
        assert_eq!(config.public_url, "https://witness.example");
        assert_eq!(config.max_commit_retries, 1);
        assert!(config.require_designation);
    }

    #[test]
    fn test_identity_aid_is_public_key() {
        let provider = Arc::new(SoftwareKeyProvider::generate());
        let public_key = provider.public_key();
        let identity = WitnessIdentity::new(provider);
        assert_eq!(identity.aid(), public_key);
        assert!(!identity.sign(b"data").unwrap().is_empty());
    }
}
