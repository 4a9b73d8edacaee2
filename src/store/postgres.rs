use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use crate::store::BulkStore;
use crate::tables::ForeignKey;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Bytes handed to COPY per round trip
const COPY_CHUNK_BYTES: usize = 1 << 20;

/// PostgreSQL store. Holds a single connection for the run's whole duration.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl PgStore {
    /// Connect using explicit connection parameters
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{} as {}",
            config.host, config.port, config.name, config.user
        );

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool, tx: None })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| PipelineError::Store {
            message: "no transaction open".to_string(),
        })
    }
}

/// Double-quote an identifier for interpolation into SQL
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE {} CASCADE", quote_ident(table))
}

pub(crate) fn copy_sql(table: &str) -> String {
    format!(
        r"COPY {} FROM STDIN WITH (FORMAT csv, DELIMITER E'\t', NULL '\N', HEADER true)",
        quote_ident(table)
    )
}

pub(crate) fn delete_orphans_sql(table: &str, fk: &ForeignKey) -> String {
    let parent = fk.references.descriptor().table_name;
    format!(
        "DELETE FROM {child} c WHERE c.{col} IS NOT NULL AND NOT EXISTS \
         (SELECT 1 FROM {parent} p WHERE p.{pcol} = c.{col})",
        child = quote_ident(table),
        col = quote_ident(fk.column),
        parent = quote_ident(parent),
        pcol = quote_ident(fk.referenced_column),
    )
}

#[async_trait]
impl BulkStore for PgStore {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(PipelineError::Store {
                message: "transaction already open".to_string(),
            });
        }
        self.tx = Some(self.pool.begin().await?);
        debug!("Transaction opened");
        Ok(())
    }

    async fn truncate_cascade(&mut self, table: &str) -> Result<()> {
        let sql = truncate_sql(table);
        let tx = self.tx()?;
        sqlx::query(&sql).execute(&mut **tx).await?;
        Ok(())
    }

    async fn copy_in(
        &mut self,
        table: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let sql = copy_sql(table);
        let tx = self.tx()?;
        let mut copy = tx.copy_in_raw(&sql).await?;

        let mut buf = vec![0u8; COPY_CHUNK_BYTES];
        loop {
            let n = match source.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = copy.abort(format!("reading source failed: {}", e)).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            copy.send(&buf[..n]).await?;
        }

        let rows = copy.finish().await?;
        Ok(rows)
    }

    async fn delete_orphans(&mut self, table: &str, fk: &ForeignKey) -> Result<u64> {
        let sql = delete_orphans_sql(table, fk);
        let tx = self.tx()?;
        let result = sqlx::query(&sql).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| PipelineError::Store {
            message: "no transaction to commit".to_string(),
        })?;
        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }
}
