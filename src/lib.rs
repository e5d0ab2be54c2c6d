//! # claims-cleanup
//!
//! Batch cleaning job for the claims fact table. It reads
//! `<catalog>.<schema>.fct_claim` from a Databricks SQL warehouse, cleans it in
//! memory with Polars and overwrites two tables with the result:
//! `cleaned_claims` and `fct_claim_features_after_datacleanup`.
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn example() -> claims_cleanup::error::Result<()> {
//! let summary = claims_cleanup::pipeline::run_from_env().await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`cleaning`]: the ordered cleaning rules and their report
//! - [`warehouse`]: the engine seam, with Databricks and in-memory engines
//! - [`pipeline`]: connect, load, clean, write, close
//! - [`config`]: environment variables and table names
//! - [`error`]: error types and handling utilities
//! - [`logging`]: console and rolling file logs
//!
//! ## Testing without a warehouse
//!
//! [`warehouse::MemoryWarehouse`] implements both seams, so the whole job can
//! run in process:
//!
//! ```no_run
//! use claims_cleanup::config::TableNames;
//! use claims_cleanup::warehouse::MemoryWarehouse;
//! # use polars::prelude::DataFrame;
//!
//! # async fn example(claims: DataFrame) -> claims_cleanup::error::Result<()> {
//! let tables = TableNames::default();
//! let warehouse = MemoryWarehouse::new().with_table(tables.source.clone(), claims);
//! let env = |name: &str| match name {
//!     "DATABRICKS_HTTP_PATH" => Some("/sql/1.0/warehouses/local".to_owned()),
//!     _ => Some("local".to_owned()),
//! };
//! claims_cleanup::pipeline::run(env, &warehouse).await?;
//! assert!(warehouse.table(&tables.cleaned).is_some());
//! # Ok(())
//! # }
//! ```

pub mod cleaning;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod warehouse;
