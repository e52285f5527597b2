//! Process configuration: database URL, root key, and key id.
//!
//! Loadable from a JSON file or from the environment. The root key is
//! hex-encoded in configuration and turned into key material exactly once,
//! when the cryptographer is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use sealbox_crypto::{ContentCryptographer, CryptoError, RootKey, KEY_SIZE};

pub const ENV_DATABASE_URL: &str = "SEALBOX_DATABASE_URL";
pub const ENV_KEY_ID: &str = "SEALBOX_KEY_ID";
pub const ENV_ROOT_KEY: &str = "SEALBOX_ROOT_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found")]
    NotFound,
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing environment variable {0}")]
    MissingVar(String),
    #[error("invalid root key: {0}")]
    InvalidRootKey(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// `sqlite://...` URL for the backing store.
    pub database_url: String,
    /// Identifier stamped into envelopes written under the root key.
    pub key_id: String,
    /// 32-byte root key, hex-encoded.
    pub root_key: String,
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
        };
        Ok(Self {
            database_url: var(ENV_DATABASE_URL)?,
            key_id: var(ENV_KEY_ID)?,
            root_key: var(ENV_ROOT_KEY)?,
        })
    }

    /// Decode the hex root key into key material.
    pub fn root_key(&self) -> Result<RootKey, ConfigError> {
        let bytes = hex::decode(&self.root_key)
            .map_err(|e| ConfigError::InvalidRootKey(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidRootKey(format!("expected {KEY_SIZE} bytes")))?;
        Ok(RootKey::new(bytes))
    }

    pub fn cryptographer(&self) -> Result<ContentCryptographer, ConfigError> {
        Ok(ContentCryptographer::new(self.key_id.as_str(), self.root_key()?)?)
    }
}
