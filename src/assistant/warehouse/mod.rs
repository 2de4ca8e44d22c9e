//! Data warehouse access.
//!
//! The agent only talks to the warehouse through the [`Warehouse`] trait so
//! tests can swap in an in-memory table.

pub mod bigquery;
pub mod credentials;
pub mod result_set;

use std::future::Future;
use std::pin::Pin;

pub use bigquery::BigQueryWarehouse;
pub use credentials::{StaticToken, TokenSource};
pub use result_set::ResultSet;

use crate::assistant::core::errors::WarehouseResult;

/// Boxed future returned by warehouse operations.
pub type WarehouseFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read access to the hospital-statistics warehouse.
pub trait Warehouse: Send + Sync {
    /// Check that the warehouse answers with the configured credentials.
    fn ping(&self) -> WarehouseFuture<'_, WarehouseResult<()>>;

    /// Run a SQL statement and return at most `max_rows` rows.
    fn query<'a>(&'a self, sql: &'a str, max_rows: usize)
    -> WarehouseFuture<'a, WarehouseResult<ResultSet>>;

    /// Dataset the unqualified table names resolve against.
    fn dataset(&self) -> &str;
}
