//! API key material.
//!
//! The secret is held in zeroizing memory and never printed: `Debug` shows
//! only a redacted marker.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{RestError, RestResult};

/// Where a credential value is read from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// Read from an environment variable.
    EnvVar { var_name: String },
    /// Read from a file; surrounding whitespace is trimmed.
    File { path: PathBuf },
}

impl KeySource {
    pub fn env(var_name: impl Into<String>) -> Self {
        Self::EnvVar {
            var_name: var_name.into(),
        }
    }

    /// Read the value without copying it into non-zeroizing memory.
    pub fn load(&self) -> RestResult<Zeroizing<String>> {
        let raw = match self {
            Self::EnvVar { var_name } => Zeroizing::new(
                std::env::var(var_name)
                    .map_err(|_| RestError::Credentials(format!("{var_name} is not set")))?,
            ),
            Self::File { path } => Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
                RestError::Credentials(format!("failed to read {}: {e}", path.display()))
            })?),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RestError::Credentials(format!("{} is empty", self.describe())));
        }
        Ok(Zeroizing::new(trimmed.to_string()))
    }

    fn describe(&self) -> String {
        match self {
            Self::EnvVar { var_name } => var_name.clone(),
            Self::File { path } => path.display().to_string(),
        }
    }
}

/// API key and secret for signed requests.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret: Zeroizing<String>,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Load both halves from their configured sources.
    pub fn load(api_key: &KeySource, secret: &KeySource) -> RestResult<Self> {
        let key = api_key.load()?;
        let secret = secret.load()?;
        Ok(Self {
            api_key: key.to_string(),
            secret,
        })
    }

    /// Public API key, sent in the request header.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
