use readgate_query::Backend;
use std::fmt;
use thiserror::Error;

use crate::gate::AllowList;

/// Startup configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key must not be empty")]
    EmptyApiKey,

    #[error("No valid entry in allow-list: {0}")]
    InvalidAllowList(String),
}

/// Immutable gateway configuration, built once at startup
#[derive(Clone)]
pub struct GatewayConfig {
    backend: Backend,
    api_key: String,
    allow_list: AllowList,
}

impl GatewayConfig {
    pub fn new(
        backend: Backend,
        api_key: impl Into<String>,
        allow_list: AllowList,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        Ok(Self {
            backend,
            api_key,
            allow_list,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("backend", &self.backend)
            .field("api_key", &"****")
            .field("allow_list", &self.allow_list)
            .finish()
    }
}
