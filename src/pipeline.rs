//! The cleanup job: connect, load, clean, write.
//!
//! ```text
//! run()
//!   ├─> ConnectionSettings / TableNames / CleaningRules   (no I/O)
//!   ├─> Connector::connect
//!   ├─> execute()
//!   │     ├─> load_table      SELECT * FROM fct_claim
//!   │     ├─> clean_df        ordered cleaning rules
//!   │     └─> write_outputs   cleaned_claims, then the feature table
//!   └─> Warehouse::close      always, even after a failure
//! ```
//!
//! Stages run one after the other with no retries. The first error aborts the
//! run. A failure between the two writes leaves the cleaned table written and
//! the feature table as it was.

use crate::cleaning::{CleanedFrame, CleaningReport, CleaningRules, clean_df};
use crate::config::{self, ConnectionSettings, TableNames};
use crate::error::{Result, ResultExt as _};
use crate::warehouse::{Connector, DatabricksConnector, TableName, Warehouse};
use polars::prelude::DataFrame;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tables: TableNames,
    pub report: CleaningReport,
    pub duration: Duration,
}

impl RunSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} into {} and {} in {:.2}s",
            self.report.summary(),
            self.tables.cleaned,
            self.tables.feature,
            self.duration.as_secs_f64()
        )
    }
}

/// Run the job against Databricks using the process environment.
///
/// # Errors
///
/// See [`run`].
pub async fn run_from_env() -> Result<RunSummary> {
    run(config::env_lookup, &DatabricksConnector::default()).await
}

/// Run the job with settings from `lookup` against `connector`.
///
/// All configuration is read and checked before the connector is called. The
/// session is closed whether or not the job succeeds; if both the job and the
/// close fail, the job's error is returned.
///
/// # Errors
///
/// Returns a configuration error for missing settings or bad rules, and
/// otherwise the first error raised by the loader, cleaner or writer.
pub async fn run<C: Connector>(
    lookup: impl Fn(&str) -> Option<String>,
    connector: &C,
) -> Result<RunSummary> {
    let start = Instant::now();

    let settings = ConnectionSettings::from_lookup(&lookup)?;
    let tables = TableNames::from_lookup(&lookup);
    let rules = config::rules_from_lookup(&lookup)?;

    let session = connector.connect(&settings).await?;

    let outcome = execute(&session, &tables, &rules).await;
    let closed = session.close().await;

    let report = match (outcome, closed) {
        (Ok(report), Ok(())) => report,
        (Ok(_), Err(e)) => return Err(e.context("Failed to close session")),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!("Failed to close session after error: {close_err}");
            }
            return Err(e);
        }
    };

    Ok(RunSummary {
        tables,
        report,
        duration: start.elapsed(),
    })
}

/// Load, clean and write using an open session.
///
/// # Errors
///
/// Returns the first error from any stage.
pub async fn execute<W: Warehouse>(
    warehouse: &W,
    tables: &TableNames,
    rules: &CleaningRules,
) -> Result<CleaningReport> {
    let df = load_table(warehouse, &tables.source).await?;

    let CleanedFrame { frame, report } = clean_df(df, rules)?;
    info!("{}", report.summary());

    write_outputs(warehouse, tables, &frame).await?;
    Ok(report)
}

/// Read a whole table. The table must fit in memory.
///
/// # Errors
///
/// Propagates the warehouse's error.
pub async fn load_table<W: Warehouse>(warehouse: &W, table: &TableName) -> Result<DataFrame> {
    info!("Reading source table: {table}");
    let df = warehouse.read_table(table).await?;
    info!("Rows in source: {}, columns: {}", df.height(), df.width());
    Ok(df)
}

/// Overwrite the cleaned table, then the feature table, with the same frame.
///
/// # Errors
///
/// Stops at the first failed write.
pub async fn write_outputs<W: Warehouse>(
    warehouse: &W,
    tables: &TableNames,
    df: &DataFrame,
) -> Result<()> {
    info!("Writing cleaned table (overwrite): {}", tables.cleaned);
    warehouse
        .overwrite_table(&tables.cleaned, df)
        .await
        .with_context(|| format!("Failed to write {}", tables.cleaned))?;
    info!("Cleaned table written");

    info!("Writing feature table (overwrite): {}", tables.feature);
    warehouse
        .overwrite_table(&tables.feature, df)
        .await
        .with_context(|| format!("Failed to write {}", tables.feature))?;
    info!("Feature table written");

    Ok(())
}
