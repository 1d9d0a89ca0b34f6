use crate::error::{QueryError, Result};
use crate::traits::BackendAdapter;
use crate::types::Backend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Connection configuration for creating adapters
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Backend the connection string points at
    pub backend: Backend,
    /// Full connection string, credentials included
    pub url: String,
}

impl ConnectionConfig {
    pub fn new(backend: Backend, url: impl Into<String>) -> Self {
        Self {
            backend,
            url: url.into(),
        }
    }

    /// Get connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => format!("{}://<unparseable>", self.backend),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("url", &self.connection_string())
            .finish()
    }
}

/// Factory trait for creating adapters from configurations
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Get the backend this factory handles
    fn backend(&self) -> Backend;

    /// Create an adapter from configuration. Does not connect.
    async fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn BackendAdapter>>;
}

/// Registry of adapter factories, one per backend
pub struct AdapterRegistry {
    factories: Arc<RwLock<HashMap<Backend, Arc<dyn AdapterFactory>>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory for a backend
    pub async fn register_factory(&self, factory: Arc<dyn AdapterFactory>) -> Result<()> {
        let backend = factory.backend();
        let mut factories = self.factories.write().await;

        if factories.contains_key(&backend) {
            warn!("Overwriting existing factory for backend: {}", backend);
        }

        factories.insert(backend, factory);
        debug!("Registered factory for backend: {}", backend);
        Ok(())
    }

    /// Create the adapter for a connection configuration
    pub async fn create_adapter(&self, config: &ConnectionConfig) -> Result<Arc<dyn BackendAdapter>> {
        let factory = self
            .factories
            .read()
            .await
            .get(&config.backend)
            .cloned()
            .ok_or_else(|| {
                QueryError::Internal(format!(
                    "No factory registered for backend: {}",
                    config.backend
                ))
            })?;

        debug!(
            "Creating adapter for {}",
            config.connection_string()
        );

        factory.create(config).await
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
