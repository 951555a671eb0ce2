//! Service configuration

use kel_witness::{SoftwareKeyProvider, WitnessConfig, WitnessError};

/// Runtime configuration for the witness service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port
    pub port: u16,
    /// Redis URL. When unset, state lives in process memory.
    pub redis_url: Option<String>,
    /// Key prefix for everything this witness writes to Redis
    pub redis_namespace: String,
    /// Base64url P-256 secret for the witness's signing key
    pub seed: Option<String>,
    pub witness: WitnessConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, WitnessError> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "80".to_string())
            .parse()
            .map_err(|e| WitnessError::Config(format!("PORT must be a valid number: {}", e)))?;

        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty());
        let redis_namespace =
            std::env::var("REDIS_NAMESPACE").unwrap_or_else(|_| "witness".to_string());
        let seed = std::env::var("WITNESS_SEED").ok().filter(|s| !s.is_empty());

        Ok(Self {
            port,
            redis_url,
            redis_namespace,
            seed,
            witness: WitnessConfig::from_env()?,
        })
    }

    /// The configured signing key, or a fresh one when no seed is set.
    pub fn key_provider(&self) -> Result<SoftwareKeyProvider, WitnessError> {
        match &self.seed {
            Some(seed) => SoftwareKeyProvider::from_encoded_seed(seed),
            None => {
                tracing::warn!(
                    "WITNESS_SEED not set, using an ephemeral signing key; receipts will not verify after restart"
                );
                Ok(SoftwareKeyProvider::generate())
            }
        }
    }
}
