//! The database connection seam.
//!
//! Mappers receive an `Arc<dyn Connection>` at construction and run every
//! statement through it sequentially. [`PgConnection`] is the production
//! implementation over a single `tokio_postgres::Client`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::core::tls::TlsBuilder;
use crate::core::value::{Record, SqlValue};
use crate::error::{MapperError, Result};

/// A single database session.
///
/// Transactions are flat: [`Connection::begin`] fails while one is already
/// open, leaving the open transaction untouched.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a statement that returns rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>>;

    /// Run a statement and return the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}

/// Convert a driver row into a [`Record`], keyed by result column name.
pub fn record_from_row(row: &Row) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value: SqlValue = row.try_get(idx)?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn as_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Nested-transaction error shared by connection implementations.
pub(crate) fn nested_transaction_error() -> MapperError {
    MapperError::transaction(
        "begin",
        MapperError::Validation("a transaction is already open on this connection".into()),
    )
}

/// PostgreSQL connection over one `tokio_postgres::Client`.
pub struct PgConnection {
    client: Client,
    in_transaction: AtomicBool,
}

impl PgConnection {
    /// Connect using the configured host, credentials, and TLS mode.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pg_config = config.pg_config();

        let client = match TlsBuilder::new(config.ssl_mode).build()? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
            None => {
                let (client, connection) = pg_config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
        };

        info!(
            "Connected to PostgreSQL {}:{}/{} (ssl_mode={})",
            config.host,
            config.port,
            config.database,
            config.ssl_mode.as_str()
        );

        Ok(Self::from_client(client))
    }

    /// Connect from a libpq-style connection string without TLS.
    pub async fn connect_str(conninfo: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conninfo, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Server version string, used by health checks.
    pub async fn server_version(&self) -> Result<String> {
        let row = self.client.query_one("SELECT version()", &[]).await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>> {
        debug!(params = params.len(), "query: {}", sql);
        let rows = self.client.query(sql, &as_params(params)).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(params = params.len(), "execute: {}", sql);
        Ok(self.client.execute(sql, &as_params(params)).await?)
    }

    async fn begin(&self) -> Result<()> {
        if self
            .in_transaction
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(nested_transaction_error());
        }
        if let Err(e) = self.client.batch_execute("BEGIN").await {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let result = self.client.batch_execute("COMMIT").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(result?)
    }

    async fn rollback(&self) -> Result<()> {
        let result = self.client.batch_execute("ROLLBACK").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(result?)
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }
}
