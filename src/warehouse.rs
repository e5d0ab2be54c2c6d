//! Access to the SQL engine that holds the claims tables.
//!
//! The pipeline only talks to the engine through two traits:
//!
//! - [`Connector`] opens a session from [`ConnectionSettings`].
//! - [`Warehouse`] is that session: it reads a whole table into a frame,
//!   overwrites a table with a frame and is finally closed.
//!
//! [`DatabricksConnector`] drives the Databricks SQL Statement Execution API.
//! [`MemoryWarehouse`] keeps tables in process memory for tests and dry runs.

pub mod client;
pub mod frame;
pub mod memory;
mod statement;

pub use client::{ClientOptions, DatabricksConnector, DatabricksSession};
pub use memory::MemoryWarehouse;

use crate::config::ConnectionSettings;
use crate::error::Result;
use polars::prelude::DataFrame;
use std::fmt;
use std::future::Future;

/// Fully qualified `catalog.schema.table` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Sibling table a write is staged in before it replaces this one.
    pub fn staging(&self) -> Self {
        Self {
            table: format!("{}__staging", self.table),
            ..self.clone()
        }
    }

    /// SQL form with every part back-tick quoted.
    pub fn quoted(&self) -> String {
        format!(
            "{}.{}.{}",
            frame::quote_ident(&self.catalog),
            frame::quote_ident(&self.schema),
            frame::quote_ident(&self.table)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// An open session on the engine.
pub trait Warehouse {
    /// Load every row of `table`.
    ///
    /// # Errors
    ///
    /// Returns a warehouse error when the engine rejects the query, and a data
    /// processing error when the result cannot be turned into a frame.
    fn read_table(&self, table: &TableName) -> impl Future<Output = Result<DataFrame>>;

    /// Replace `table` (schema and data) with the contents of `df`.
    ///
    /// # Errors
    ///
    /// Returns a warehouse error when any statement fails. The table is
    /// replaced in one step, so a failed write leaves the previous contents.
    fn overwrite_table(&self, table: &TableName, df: &DataFrame)
    -> impl Future<Output = Result<()>>;

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns a warehouse error when the engine cannot be told.
    fn close(self) -> impl Future<Output = Result<()>>;
}

/// Opens [`Warehouse`] sessions.
pub trait Connector {
    type Session: Warehouse;

    /// # Errors
    ///
    /// Returns a configuration error for unusable settings and a warehouse
    /// error when the engine cannot be reached.
    fn connect(&self, settings: &ConnectionSettings)
    -> impl Future<Output = Result<Self::Session>>;
}
