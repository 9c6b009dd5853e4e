//! Postgres-backed domain registry

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{debug, info};

use cdm_common::DomainSet;
use cdm_config::Config;

use super::{DomainRegistry, RegistryError};

const DOMAINS_QUERY: &str = "SELECT domain FROM custom_domains WHERE env = $1";

const MAX_CONNECTIONS: u32 = 2;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads `custom_domains` rows for one environment
#[derive(Debug, Clone)]
pub struct PgDomainRegistry {
    pool: PgPool,
    environment: String,
}

impl PgDomainRegistry {
    /// Open the pool and verify one connection can be established
    pub async fn connect(config: &Config) -> Result<Self, RegistryError> {
        let address = format!("{}:{}/{}", config.db_host, config.db_port, config.db_name);
        let options = PgConnectOptions::new()
            .host(&config.db_host)
            .port(config.db_port)
            .username(&config.db_user)
            .password(&config.db_pass)
            .database(&config.db_name)
            .ssl_mode(PgSslMode::Prefer);

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::Connect {
                address: address.clone(),
                message: e.to_string(),
            })?;

        info!(address = %address, environment = %config.environment, "Connected to domain registry");
        Ok(Self::from_pool(pool, config.environment.clone()))
    }

    pub fn from_pool(pool: PgPool, environment: String) -> Self {
        Self { pool, environment }
    }
}

#[async_trait]
impl DomainRegistry for PgDomainRegistry {
    async fn domains(&self) -> Result<DomainSet, RegistryError> {
        let rows: Vec<String> = sqlx::query_scalar(DOMAINS_QUERY)
            .bind(&self.environment)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::Query {
                environment: self.environment.clone(),
                message: e.to_string(),
            })?;

        let domains = DomainSet::from(rows);
        debug!(environment = %self.environment, count = domains.len(), "Fetched desired domains");
        Ok(domains)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| RegistryError::Query {
                environment: self.environment.clone(),
                message: e.to_string(),
            })
    }
}
