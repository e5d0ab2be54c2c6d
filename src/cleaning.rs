//! The cleaning pipeline.
//!
//! [`clean_df`] applies a fixed, ordered sequence of rules to an in-memory
//! frame:
//!
//! 1. drop rows where every column is missing (null, or NaN in a float column)
//! 2. drop columns whose missing fraction exceeds the threshold
//! 3. drop identifier columns
//! 4. coerce date columns to datetimes (unparseable values become null)
//! 5. back-fill date columns from related dates, in rule order
//! 6. fill categorical nulls with a constant
//! 7. remove rows outside the IQR fence of the outlier column
//! 8. drop exact duplicate rows
//!
//! Rules whose columns are absent are skipped and listed in the report.
//!
//! ```no_run
//! use claims_cleanup::cleaning::{clean_df, CleaningRules};
//! use polars::prelude::*;
//!
//! # fn example(df: DataFrame) -> claims_cleanup::error::Result<()> {
//! let cleaned = clean_df(df, &CleaningRules::default())?;
//! println!("{}", cleaned.report.summary());
//! # Ok(())
//! # }
//! ```

pub mod report;
pub mod rules;
pub mod stats;
pub mod temporal;

mod steps;


pub use report::{CleaningReport, ColumnCount};
pub use rules::{CategoricalFill, CleaningRules, DateImputation, OutlierFilter};
pub use stats::IqrFence;

use crate::error::Result;
use polars::prelude::DataFrame;

/// A cleaned frame together with the diagnostics gathered while cleaning it.
#[derive(Debug, Clone)]
pub struct CleanedFrame {
    pub frame: DataFrame,
    pub report: CleaningReport,
}

/// Run every cleaning rule over `df`.
///
/// # Errors
///
/// Returns a configuration error for invalid rules, and a data processing
/// error when a frame operation fails or the outlier column is not numeric.
pub fn clean_df(df: DataFrame, rules: &CleaningRules) -> Result<CleanedFrame> {
    rules.validate()?;

    let mut report = CleaningReport::new(df.height(), df.width());

    let mut df = steps::drop_empty_rows(df, &mut report)?;
    df = steps::drop_sparse_columns(df, rules.missing_threshold, &mut report)?;
    df = steps::drop_columns(df, &rules.drop_columns, &mut report)?;
    df = steps::parse_dates(df, &rules.date_columns, &mut report)?;
    for imputation in &rules.date_imputations {
        df = steps::impute_date(df, imputation, &mut report)?;
    }
    for fill in &rules.categorical_fills {
        df = steps::fill_category(df, fill, &mut report)?;
    }
    if let Some(filter) = &rules.outlier_filter {
        df = steps::remove_outliers(df, filter, &mut report)?;
    }
    if rules.drop_duplicates {
        df = steps::drop_duplicates(df, &mut report)?;
    }

    report.rows_after = df.height();
    report.columns_after = df.width();
    tracing::info!("After cleaning shape: ({}, {})", df.height(), df.width());

    Ok(CleanedFrame { frame: df, report })
}
