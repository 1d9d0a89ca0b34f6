use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use readgate_query::{AdapterRegistry, Backend, ConnectionConfig};
use readgate_query_mongodb::MongoFactory;
use readgate_query_mysql::MySqlFactory;
use readgate_query_postgres::PostgresFactory;
use readgate_server::{configure_routes, AllowList, GatewayConfig, GatewayState};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct ServeCommand {
    /// Shared secret expected in the X-API-Key header
    #[arg(long, env = "CONNECTOR_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Backend connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Backend type (postgresql, mysql, mongodb); inferred from the URL when absent
    #[arg(long, env = "DATABASE_TYPE")]
    pub database_type: Option<String>,

    /// Comma-separated client IPs or CIDR ranges; empty allows every network
    #[arg(long, default_value = "", env = "WHITELISTED_IPS")]
    pub whitelisted_ips: String,

    /// Host to bind the server to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let backend = resolve_backend(self.database_type.as_deref(), &self.database_url)?;
        let allow_list = AllowList::parse(&self.whitelisted_ips)?;
        let config = GatewayConfig::new(backend, self.api_key.clone(), allow_list)?;

        if config.allow_list().is_empty() {
            warn!("No client allow-list configured; any network may reach the gateway");
        } else {
            info!(
                "Client allow-list active with {} network(s)",
                config.allow_list().len()
            );
        }

        let address: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(serve(config, self.database_url, address))
    }
}

async fn serve(config: GatewayConfig, database_url: String, address: SocketAddr) -> anyhow::Result<()> {
    let registry = AdapterRegistry::new();
    registry.register_factory(Arc::new(PostgresFactory)).await?;
    registry.register_factory(Arc::new(MySqlFactory)).await?;
    registry.register_factory(Arc::new(MongoFactory)).await?;

    let connection = ConnectionConfig::new(config.backend(), database_url);
    debug!(
        "Creating {} adapter for {}",
        config.backend(),
        connection.connection_string()
    );
    let adapter = registry
        .create_adapter(&connection)
        .await
        .with_context(|| format!("Failed to configure {} backend", config.backend()))?;

    if let Err(e) = adapter.ping().await {
        warn!("Backend is not reachable yet: {}", e);
    }

    let backend = config.backend();
    let app = configure_routes(Arc::new(GatewayState::new(config, adapter)));

    let listener = TcpListener::bind(address).await?;
    info!("Readgate listening on {} for {}", address, backend);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Readgate server exited");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

/// Backend from an explicit type, else from the URL scheme
fn resolve_backend(database_type: Option<&str>, database_url: &str) -> anyhow::Result<Backend> {
    match database_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(name) => name
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| anyhow::anyhow!("Unsupported database type: {}", name)),
        None => Backend::from_url(database_url).ok_or_else(|| {
            anyhow::anyhow!("Cannot infer database type from DATABASE_URL; set DATABASE_TYPE")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_backend_from_type() {
        assert_eq!(
            resolve_backend(Some("MySQL"), "postgres://h/db").unwrap(),
            Backend::MySql
        );
        assert!(resolve_backend(Some("oracle"), "postgres://h/db").is_err());
    }

    #[test]
    fn test_resolve_backend_from_url() {
        assert_eq!(
            resolve_backend(None, "postgresql://u:p@h:5432/db").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            resolve_backend(Some("  "), "mongodb+srv://cluster/app").unwrap(),
            Backend::MongoDb
        );
        assert!(resolve_backend(None, "redis://h").is_err());
    }
}
