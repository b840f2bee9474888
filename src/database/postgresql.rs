//! PostgreSQL client over `tokio-postgres`.
//!
//! Databases of other engines are realised as schemas, so one connection reaches
//! LIVE, RAW and STAGING alike.

use super::sql::SqlClient;
use super::sanitize_connection_string;
use crate::config::ConnectionConfig;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use load_core::{TypedValue, UniversalType, UniversalValue};
use postgresql_types::{forward::to_params, row_to_values};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::error;

pub struct PostgresClient {
    client: Client,
    description: String,
}

impl PostgresClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let password = config.resolve_password()?;
        let description =
            sanitize_connection_string(&config.connection_string(password.as_deref()));

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port())
            .dbname(config.database.as_deref().unwrap_or("postgres"));
        if let Some(user) = &config.user {
            pg.user(user);
        }
        if let Some(password) = &password {
            pg.password(password);
        }

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            LoadError::database(format!("connect to {description}"), e.is_closed(), e)
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        Ok(Self {
            client,
            description,
        })
    }
}

#[async_trait]
impl SqlClient for PostgresClient {
    async fn execute(&self, sql: &str, params: &[TypedValue]) -> anyhow::Result<u64> {
        if params.is_empty() {
            // Trigger functions are several statements with dollar quoting
            self.client.batch_execute(sql).await?;
            return Ok(0);
        }
        let boxed = to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        Ok(self.client.execute(sql, &refs).await?)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[TypedValue],
        column_types: &[UniversalType],
    ) -> anyhow::Result<Vec<Vec<UniversalValue>>> {
        let boxed = to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(sql, &refs).await?;
        rows.iter()
            .map(|row| row_to_values(row, column_types).map_err(anyhow::Error::from))
            .collect()
    }

    fn is_transient(&self, err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return true;
            }
            let Some(pg) = cause.downcast_ref::<tokio_postgres::Error>() else {
                return false;
            };
            pg.is_closed()
                || matches!(
                    pg.code(),
                    Some(code) if *code == SqlState::T_R_DEADLOCK_DETECTED
                        || *code == SqlState::LOCK_NOT_AVAILABLE
                        || *code == SqlState::T_R_SERIALIZATION_FAILURE
                )
        })
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
