//! Node configuration.

use serde::{Deserialize, Serialize};

use mycel_core::Keypair;
use mycel_sync::SyncConfig;
use mycel_token::{TokenPolicy, DEFAULT_TOKEN_TTL_MS};

use crate::error::{NodeError, Result};

/// Configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Token lifetime in milliseconds.
    pub token_ttl_ms: u64,
    /// How long after expiry a token may still be renewed.
    pub renewal_grace_ms: u64,
    /// Hex-encoded 32-byte seed for the token signing key.
    /// A fresh key is generated when absent.
    pub signing_seed: Option<String>,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let policy = TokenPolicy::default();
        Self {
            token_ttl_ms: DEFAULT_TOKEN_TTL_MS,
            renewal_grace_ms: policy.renewal_grace_ms,
            signing_seed: None,
            sync: SyncConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NodeError::Config(e.to_string()))?;
        if config.token_ttl_ms == 0 {
            return Err(NodeError::Config("token_ttl_ms must be positive".into()));
        }
        if config.sync.max_entries_per_round == 0 {
            return Err(NodeError::Config(
                "sync.max_entries_per_round must be positive".into(),
            ));
        }
        Ok(config)
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            ttl_ms: self.token_ttl_ms,
            renewal_grace_ms: self.renewal_grace_ms,
        }
    }

    /// The signing key described by this config.
    pub fn keypair(&self) -> Result<Keypair> {
        match &self.signing_seed {
            None => Ok(Keypair::generate()),
            Some(seed) => {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(seed, &mut bytes)
                    .map_err(|e| NodeError::Config(format!("signing_seed: {e}")))?;
                Ok(Keypair::from_seed(&bytes))
            }
        }
    }
}
