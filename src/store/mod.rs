//! Relational store seam used by the loader.
//!
//! The loader only needs a handful of capabilities: one transaction per run,
//! cascading truncate, a bulk text-copy path, and orphan deletes. Keeping them
//! behind a trait lets the ordering and rollback logic run against
//! [`MemoryStore`] as well as PostgreSQL.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::tables::ForeignKey;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use memory::{MemoryStore, MemoryTable};
pub use postgres::PgStore;

/// Bulk-load capabilities of a relational store.
///
/// Every method other than `begin` operates inside the transaction opened by
/// `begin`; calling them without one is an error.
#[async_trait]
pub trait BulkStore: Send {
    /// Open the run-level transaction
    async fn begin(&mut self) -> Result<()>;

    /// Remove every row of `table` and of tables referencing it
    async fn truncate_cascade(&mut self, table: &str) -> Result<()>;

    /// Append rows from tab-delimited text with a header row and `\N` nulls.
    /// Returns the number of rows copied.
    async fn copy_in(
        &mut self,
        table: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64>;

    /// Delete rows of `table` whose `fk` value has no match in the referenced table.
    /// Returns the number of rows deleted.
    async fn delete_orphans(&mut self, table: &str, fk: &ForeignKey) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    /// Abandon the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<()>;
}
