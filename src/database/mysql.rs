//! MySQL client over a `mysql_async` pool.

use super::sql::SqlClient;
use super::sanitize_connection_string;
use crate::config::ConnectionConfig;
use crate::error::Result;
use anyhow::Context;
use async_trait::async_trait;
use load_core::{TypedValue, UniversalType, UniversalValue};
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Params, Pool, Row};
use mysql_types::{forward::to_params, row_to_values};

/// Server error codes worth retrying: lock wait timeout, deadlock, server gone, lost
/// connection.
const TRANSIENT_CODES: [u16; 4] = [1205, 1213, 2006, 2013];

pub struct MySqlClient {
    pool: Pool,
    description: String,
}

impl MySqlClient {
    /// Build the pool. Connections are opened lazily, so credentials are verified by
    /// the first statement (`Database::ping`).
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let password = config.resolve_password()?;
        let description =
            sanitize_connection_string(&config.connection_string(password.as_deref()));
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port())
            .user(config.user.clone())
            .pass(password)
            .db_name(config.database.clone());
        Ok(Self {
            pool: Pool::new(opts),
            description,
        })
    }

    fn params(params: &[TypedValue]) -> Params {
        Params::Positional(to_params(params))
    }
}

#[async_trait]
impl SqlClient for MySqlClient {
    async fn execute(&self, sql: &str, params: &[TypedValue]) -> anyhow::Result<u64> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to {}", self.description))?;
        // Trigger DDL is rejected by the prepared statement protocol
        if params.is_empty() {
            conn.query_drop(sql).await?;
        } else {
            conn.exec_drop(sql, Self::params(params)).await?;
        }
        Ok(conn.affected_rows())
    }

    async fn query(
        &self,
        sql: &str,
        params: &[TypedValue],
        column_types: &[UniversalType],
    ) -> anyhow::Result<Vec<Vec<UniversalValue>>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to {}", self.description))?;
        let rows: Vec<Row> = if params.is_empty() {
            conn.query(sql).await?
        } else {
            conn.exec(sql, Self::params(params)).await?
        };
        rows.into_iter()
            .map(|row| row_to_values(row, column_types).map_err(anyhow::Error::from))
            .collect()
    }

    fn is_transient(&self, err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| match cause.downcast_ref::<mysql_async::Error>() {
                Some(mysql_async::Error::Io(_)) => true,
                Some(mysql_async::Error::Server(server)) => TRANSIENT_CODES.contains(&server.code),
                _ => false,
            })
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
