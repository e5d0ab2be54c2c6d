use super::report::{CleaningReport, ColumnCount};
use super::rules::{CategoricalFill, DateImputation, OutlierFilter};
use super::stats;
use super::temporal::{self, MILLIS_PER_DAY};
use crate::error::{CleanupError, Result};
use polars::prelude::*;
use tracing::{debug, info};

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

fn keep_columns(df: &DataFrame, dropped: &[String]) -> Result<DataFrame> {
    let keep: Vec<PlSmallStr> = df
        .get_columns()
        .iter()
        .map(|c| c.name().clone())
        .filter(|name| !dropped.iter().any(|d| d == name.as_str()))
        .collect();
    Ok(df.select(keep)?)
}

/// Present in a row: not null and, for floats, not NaN.
fn populated(name: &str, dtype: &DataType) -> Expr {
    if dtype.is_float() {
        col(name).is_not_nan().fill_null(lit(false))
    } else {
        col(name).is_not_null()
    }
}

/// Missing in a row: null or, for floats, NaN.
fn missing(name: &str, dtype: &DataType) -> Expr {
    if dtype.is_float() {
        col(name).is_nan().fill_null(lit(true))
    } else {
        col(name).is_null()
    }
}

/// Rule 1: drop rows where every column is missing.
pub(super) fn drop_empty_rows(df: DataFrame, report: &mut CleaningReport) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df);
    }

    let any_populated = df
        .get_columns()
        .iter()
        .map(|c| populated(c.name(), c.dtype()))
        .reduce(|acc, next| acc.or(next))
        .unwrap_or_else(|| lit(true));

    let before = df.height();
    let df = df.lazy().filter(any_populated).collect()?;
    report.empty_rows_dropped = before - df.height();
    info!("Dropped {} fully empty rows", report.empty_rows_dropped);
    Ok(df)
}

/// Rule 2: drop columns whose missing fraction is strictly above `threshold`.
pub(super) fn drop_sparse_columns(
    df: DataFrame,
    threshold: f64,
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df);
    }

    let fractions = df
        .clone()
        .lazy()
        .select(
            df.get_columns()
                .iter()
                .map(|c| {
                    missing(c.name(), c.dtype())
                        .cast(DataType::Float64)
                        .mean()
                        .alias(c.name().clone())
                })
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let mut sparse = Vec::new();
    for column in fractions.get_columns() {
        let fraction = column.as_materialized_series().f64()?.get(0).unwrap_or(0.0);
        if fraction > threshold {
            sparse.push(column.name().to_string());
        }
    }

    if sparse.is_empty() {
        return Ok(df);
    }

    info!(
        "Dropping columns with >{:.0}% missing: {sparse:?}",
        threshold * 100.0
    );
    let df = keep_columns(&df, &sparse)?;
    report.sparse_columns_dropped = sparse;
    Ok(df)
}

/// Rule 3: drop configured columns that are present; absent ones are ignored.
pub(super) fn drop_columns(
    df: DataFrame,
    names: &[String],
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    let present: Vec<String> = names
        .iter()
        .filter(|name| has_column(&df, name))
        .cloned()
        .collect();
    if present.is_empty() {
        debug!("No identifier columns to drop");
        return Ok(df);
    }

    let df = keep_columns(&df, &present)?;
    report.columns_dropped = present;
    Ok(df)
}

/// Rule 4: coerce date columns to datetimes; unparseable values become null.
pub(super) fn parse_dates(
    mut df: DataFrame,
    names: &[String],
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    for name in names {
        if !has_column(&df, name) {
            report.skip(format!("date parse {name}"));
            continue;
        }

        let series = df.column(name)?.as_materialized_series();
        let parsed = temporal::coerce_datetime(series)?;
        let unparseable = parsed.null_count().saturating_sub(series.null_count());

        df.replace(name, parsed)?;
        if unparseable > 0 {
            info!("Coerced {unparseable} unparseable values in {name} to null");
        }
        report
            .unparseable_dates
            .push(ColumnCount::new(name.as_str(), unparseable));
    }
    Ok(df)
}

/// Rules 5 and 6: back-fill a date column from another one shifted by whole days.
///
/// Both columns are coerced to datetimes first if they are not already.
pub(super) fn impute_date(
    mut df: DataFrame,
    rule: &DateImputation,
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    if !(has_column(&df, &rule.target) && has_column(&df, &rule.source)) {
        report.skip(format!("date imputation {} from {}", rule.target, rule.source));
        return Ok(df);
    }

    let offset = rule.offset_days.checked_mul(MILLIS_PER_DAY).ok_or_else(|| {
        CleanupError::Config(format!("offset of {} days is out of range", rule.offset_days))
    })?;

    for name in [&rule.target, &rule.source] {
        let series = df.column(name)?.as_materialized_series();
        if series.dtype() != &temporal::datetime_dtype() {
            let coerced = temporal::coerce_datetime(series)?;
            df.replace(name, coerced)?;
        }
    }

    let before = df.column(&rule.target)?.null_count();
    let shifted = (col(rule.source.as_str()).cast(DataType::Int64) + lit(offset))
        .cast(temporal::datetime_dtype());
    let df = df
        .lazy()
        .with_column(col(rule.target.as_str()).fill_null(shifted))
        .collect()?;
    let filled = before.saturating_sub(df.column(&rule.target)?.null_count());

    info!(
        "Imputed {filled} missing {} values from {} {:+} days",
        rule.target, rule.source, rule.offset_days
    );
    report
        .dates_imputed
        .push(ColumnCount::new(rule.target.as_str(), filled));
    Ok(df)
}

/// Rule 7: replace nulls in a categorical column with a constant.
///
/// A non-string column is cast to text only when it has nulls to fill.
pub(super) fn fill_category(
    df: DataFrame,
    fill: &CategoricalFill,
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    if !has_column(&df, &fill.column) {
        report.skip(format!("categorical fill {}", fill.column));
        return Ok(df);
    }

    let column = df.column(&fill.column)?;
    let filled = column.null_count();
    let df = if filled == 0 {
        df
    } else {
        let mut values = col(fill.column.as_str());
        if column.dtype() != &DataType::String {
            debug!("Casting {} ({}) to text before filling", fill.column, column.dtype());
            values = values.cast(DataType::String);
        }
        df.lazy()
            .with_column(values.fill_null(lit(fill.value.as_str())))
            .collect()?
    };

    info!("Filled {filled} missing {} values with {:?}", fill.column, fill.value);
    report
        .categories_filled
        .push(ColumnCount::new(fill.column.as_str(), filled));
    Ok(df)
}

/// Rule 8: keep rows whose value lies inside the IQR fence. Missing values never do.
pub(super) fn remove_outliers(
    df: DataFrame,
    filter: &OutlierFilter,
    report: &mut CleaningReport,
) -> Result<DataFrame> {
    if !has_column(&df, &filter.column) {
        report.skip(format!("outlier filter {}", filter.column));
        return Ok(df);
    }

    let dtype = df.column(&filter.column)?.dtype();
    if !(dtype.is_numeric() || matches!(dtype, DataType::Null)) {
        return Err(CleanupError::DataProcessing(format!(
            "outlier column {} has non-numeric type {dtype}",
            filter.column
        )));
    }

    let fence = stats::iqr_fence(&df, &filter.column, filter.iqr_multiplier)?;
    let keep = match fence {
        Some(fence) => fence.keep_expr(stats::observed(&filter.column)),
        None => lit(false),
    };

    let before = df.height();
    let df = df.lazy().filter(keep).collect()?;
    report.outliers_removed = before - df.height();
    report.outlier_fence = fence;

    match fence {
        Some(fence) => info!(
            "Removed outliers from {}: {} rows removed (fence [{:.4}, {:.4}])",
            filter.column, report.outliers_removed, fence.lower, fence.upper
        ),
        None => info!(
            "No observed values in {}; all {} rows removed",
            filter.column, report.outliers_removed
        ),
    }
    Ok(df)
}

/// Rule 9: drop exact duplicate rows, keeping the first occurrence.
pub(super) fn drop_duplicates(df: DataFrame, report: &mut CleaningReport) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df);
    }

    let before = df.height();
    let df = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    report.duplicates_removed = before - df.height();
    info!("Dropped {} duplicate rows", report.duplicates_removed);
    Ok(df)
}
