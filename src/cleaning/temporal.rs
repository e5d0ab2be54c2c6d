//! Date/time coercion.
//!
//! All temporal columns are normalised to `Datetime(Milliseconds, None)`, read
//! as UTC wall time. Parsing never fails: anything that does not match a known
//! layout becomes null.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%Y%m%d"];

pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Parse a single value into milliseconds since the Unix epoch.
pub fn parse_datetime_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Parse a `YYYY-MM-DD` value into days since the Unix epoch.
pub fn parse_date_days(value: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    let epoch = DateTime::<Utc>::UNIX_EPOCH.date_naive();
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

/// Build a millisecond datetime series from epoch values.
///
/// # Errors
///
/// Returns an error if Polars cannot cast the physical values.
pub fn millis_to_datetime(name: PlSmallStr, millis: Vec<Option<i64>>) -> PolarsResult<Series> {
    Series::new(name, millis).cast(&datetime_dtype())
}

/// Coerce any column to a millisecond datetime series.
///
/// Date and datetime columns convert exactly (time zones are dropped, values
/// kept in UTC). Strings are parsed; every other type is rendered as text
/// first, so numbers and booleans end up null.
///
/// # Errors
///
/// Returns an error only when Polars fails an internal cast.
pub fn coerce_datetime(series: &Series) -> PolarsResult<Series> {
    let millis = datetime_millis(series)?;
    millis_to_datetime(series.name().clone(), millis)
}

/// Epoch milliseconds for every row of `series`, coercing as
/// [`coerce_datetime`] does.
///
/// # Errors
///
/// Returns an error only when Polars fails an internal cast.
pub fn datetime_millis(series: &Series) -> PolarsResult<Vec<Option<i64>>> {
    match series.dtype() {
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            let physical = series.to_physical_repr().cast(&DataType::Int64)?;
            Ok(physical
                .i64()?
                .into_iter()
                .map(|v| v.map(|v| v.div_euclid(divisor)))
                .collect())
        }
        DataType::Date => {
            let days = series.to_physical_repr().cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|v| v.map(|d| i64::from(d) * MILLIS_PER_DAY))
                .collect())
        }
        DataType::String => Ok(series
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_datetime_millis))
            .collect()),
        _ => {
            let text = series.cast(&DataType::String)?;
            Ok(text
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_datetime_millis))
                .collect())
        }
    }
}

/// Render epoch milliseconds as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn format_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

/// Render days since the epoch as `YYYY-MM-DD`.
pub fn format_days(days: i32) -> Option<String> {
    DateTime::<Utc>::from_timestamp(i64::from(days) * 86_400, 0)
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}
