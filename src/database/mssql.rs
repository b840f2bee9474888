//! SQL Server client over `tiberius`.

use super::sql::SqlClient;
use crate::config::ConnectionConfig;
use crate::error::{LoadError, Result};
use anyhow::Context;
use async_trait::async_trait;
use load_core::{TypedValue, UniversalType, UniversalValue};
use mssql_types::{forward::bind_all, row_to_values};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Lock request time out period exceeded.
const LOCK_TIMEOUT: u32 = 1222;

pub struct MssqlClient {
    client: Mutex<Client<Compat<TcpStream>>>,
    description: String,
}

impl MssqlClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let description = config.describe();
        let user = config
            .user
            .clone()
            .ok_or_else(|| LoadError::MissingCredentials(format!("{description} (no user)")))?;
        let password = config
            .resolve_password()?
            .ok_or_else(|| LoadError::MissingCredentials(format!("{description} (no password)")))?;

        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.port());
        if let Some(database) = &config.database {
            tds.database(database);
        }
        tds.authentication(AuthMethod::sql_server(&user, &password));
        if config.trust_cert {
            tds.trust_cert();
        }
        tds.encryption(if config.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });

        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| LoadError::database(format!("connect to {description}"), true, e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| LoadError::database(format!("connect to {description}"), false, e))?;

        Ok(Self {
            client: Mutex::new(client),
            description,
        })
    }
}

#[async_trait]
impl SqlClient for MssqlClient {
    async fn execute(&self, sql: &str, params: &[TypedValue]) -> anyhow::Result<u64> {
        let mut query = Query::new(sql);
        bind_all(&mut query, params);
        let mut client = self.client.lock().await;
        let result = query
            .execute(&mut *client)
            .await
            .with_context(|| format!("Statement failed on {}", self.description))?;
        Ok(result.total())
    }

    async fn query(
        &self,
        sql: &str,
        params: &[TypedValue],
        column_types: &[UniversalType],
    ) -> anyhow::Result<Vec<Vec<UniversalValue>>> {
        let mut query = Query::new(sql);
        bind_all(&mut query, params);
        let mut client = self.client.lock().await;
        let rows = query
            .query(&mut *client)
            .await?
            .into_first_result()
            .await
            .with_context(|| format!("Query failed on {}", self.description))?;
        rows.into_iter()
            .map(|row| row_to_values(row, column_types).map_err(anyhow::Error::from))
            .collect()
    }

    fn is_transient(&self, err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| match cause.downcast_ref::<tiberius::error::Error>() {
                Some(tiberius::error::Error::Io { .. }) => true,
                Some(e @ tiberius::error::Error::Server(token)) => {
                    e.is_deadlock() || token.code() == LOCK_TIMEOUT
                }
                _ => false,
            })
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
