//! Conversion between engine result sets, SQL text and frames.
//!
//! Reads arrive as `JSON_ARRAY` rows (every cell a string or null) plus a
//! schema manifest. Writes go through a staging table: `CREATE OR REPLACE`
//! the staging table, batched `INSERT ... VALUES` into it, then one
//! `CREATE OR REPLACE TABLE ... AS SELECT` swaps it into place.
//!
//! `DECIMAL` columns are held as `Float64` while cleaning. Their declared type
//! is remembered from the read so the destination keeps it.

use super::TableName;
use super::statement::ColumnInfo;
use crate::cleaning::temporal;
use crate::error::{CleanupError, Result};
use polars::prelude::*;
use std::collections::HashMap;

/// Column types as reported in the result manifest, collapsed to what a frame
/// can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Text,
}

impl EngineType {
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.trim().to_ascii_uppercase().as_str() {
            "BYTE" | "SHORT" | "INT" | "LONG" | "TINYINT" | "SMALLINT" | "BIGINT" => {
                Self::Integer
            }
            "FLOAT" | "DOUBLE" => Self::Float,
            "DECIMAL" => Self::Decimal,
            "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "TIMESTAMP" | "TIMESTAMP_NTZ" => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

/// Build a frame from manifest columns and row-major string cells.
///
/// Cells that do not decode as the column's type become null. Short rows are
/// padded with nulls.
///
/// # Errors
///
/// Returns a data processing error if Polars rejects the columns (for example
/// duplicate names).
pub(super) fn frame_from_rows(
    columns: &[ColumnInfo],
    rows: &[Vec<Option<String>>],
) -> Result<DataFrame> {
    let mut ordered: Vec<&ColumnInfo> = columns.iter().collect();
    ordered.sort_by_key(|c| c.position);

    let series = ordered
        .into_iter()
        .map(|info| {
            let cells = rows
                .iter()
                .map(|row| row.get(info.position).and_then(Option::as_deref));
            decode_column(
                info.name.as_str().into(),
                EngineType::from_type_name(&info.type_name),
                cells,
            )
        })
        .collect::<PolarsResult<Vec<Series>>>()?;

    Ok(DataFrame::new(series.into_iter().map(Column::from).collect())?)
}

/// Declared `DECIMAL(p,s)` types by column name.
pub(super) fn decimal_columns(columns: &[ColumnInfo]) -> HashMap<String, String> {
    columns
        .iter()
        .filter(|c| EngineType::from_type_name(&c.type_name) == EngineType::Decimal)
        .filter_map(|c| Some((c.name.clone(), c.type_text.clone()?)))
        .collect()
}

fn decode_column<'a>(
    name: PlSmallStr,
    kind: EngineType,
    cells: impl Iterator<Item = Option<&'a str>>,
) -> PolarsResult<Series> {
    match kind {
        EngineType::Integer => {
            let values: Vec<Option<i64>> = cells
                .map(|c| c.and_then(|v| v.trim().parse().ok()))
                .collect();
            Ok(Series::new(name, values))
        }
        EngineType::Float | EngineType::Decimal => {
            let values: Vec<Option<f64>> = cells
                .map(|c| c.and_then(|v| v.trim().parse().ok()))
                .collect();
            Ok(Series::new(name, values))
        }
        EngineType::Boolean => {
            let values: Vec<Option<bool>> = cells
                .map(|c| {
                    c.and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                        "true" => Some(true),
                        "false" => Some(false),
                        _ => None,
                    })
                })
                .collect();
            Ok(Series::new(name, values))
        }
        EngineType::Date => {
            let days: Vec<Option<i32>> = cells.map(|c| c.and_then(temporal::parse_date_days)).collect();
            Series::new(name, days).cast(&DataType::Date)
        }
        EngineType::Timestamp => {
            let millis: Vec<Option<i64>> = cells
                .map(|c| c.and_then(temporal::parse_datetime_millis))
                .collect();
            temporal::millis_to_datetime(name, millis)
        }
        EngineType::Text => {
            let values: Vec<Option<&str>> = cells.collect();
            Ok(Series::new(name, values))
        }
    }
}

/// SQL column type used when recreating a table from a frame.
pub fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "BIGINT",
        DataType::Float32 | DataType::Float64 => "DOUBLE",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Datetime(_, _) => "TIMESTAMP",
        _ => "STRING",
    }
}

/// Back-tick quote an identifier, doubling embedded back-ticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Single-quote a string literal, escaping back-slashes and quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn render_double(value: f64) -> String {
    if value.is_nan() {
        "double('NaN')".to_owned()
    } else if value.is_infinite() {
        if value > 0.0 {
            "double('Infinity')".to_owned()
        } else {
            "double('-Infinity')".to_owned()
        }
    } else {
        format!("{value:?}")
    }
}

fn null_or(value: Option<String>) -> String {
    value.unwrap_or_else(|| "NULL".to_owned())
}

/// Every value of `series` as a SQL literal, `NULL` for missing values.
///
/// # Errors
///
/// Returns a data processing error if a cast to the physical type fails.
pub fn render_column(series: &Series) -> Result<Vec<String>> {
    let dtype = series.dtype();
    let rendered = match sql_type(dtype) {
        "BIGINT" => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| null_or(v.map(|v| v.to_string())))
            .collect(),
        "DOUBLE" => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| null_or(v.map(render_double)))
            .collect(),
        "BOOLEAN" => series
            .bool()?
            .into_iter()
            .map(|v| null_or(v.map(|b| (if b { "TRUE" } else { "FALSE" }).to_owned())))
            .collect(),
        "DATE" => series
            .to_physical_repr()
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|v| null_or(v.and_then(temporal::format_days).map(|d| format!("DATE '{d}'"))))
            .collect(),
        "TIMESTAMP" => temporal::datetime_millis(series)?
            .into_iter()
            .map(|v| {
                null_or(
                    v.and_then(temporal::format_millis)
                        .map(|ts| format!("TIMESTAMP '{ts}'")),
                )
            })
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| null_or(v.map(quote_literal)))
            .collect(),
    };
    Ok(rendered)
}

fn column_list(df: &DataFrame) -> String {
    df.get_columns()
        .iter()
        .map(|c| quote_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE OR REPLACE TABLE` statement matching the frame's schema. A float
/// column named in `decimals` is declared with that type instead of `DOUBLE`.
///
/// # Errors
///
/// Returns a data processing error for a frame without columns.
pub fn create_table_sql(
    table: &TableName,
    df: &DataFrame,
    decimals: &HashMap<String, String>,
) -> Result<String> {
    if df.width() == 0 {
        return Err(CleanupError::DataProcessing(format!(
            "cannot write {table}: frame has no columns"
        )));
    }

    let columns = df
        .get_columns()
        .iter()
        .map(|c| {
            let declared = decimals
                .get(c.name().as_str())
                .filter(|_| c.dtype().is_float())
                .map_or(sql_type(c.dtype()), String::as_str);
            format!("{} {declared}", quote_ident(c.name()))
        })
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "CREATE OR REPLACE TABLE {} ({columns}) USING DELTA",
        table.quoted()
    ))
}

/// Atomically replace `table` with the contents of `staging`.
pub fn replace_from_sql(table: &TableName, staging: &TableName) -> String {
    format!(
        "CREATE OR REPLACE TABLE {} USING DELTA AS SELECT * FROM {}",
        table.quoted(),
        staging.quoted()
    )
}

pub fn drop_table_sql(table: &TableName) -> String {
    format!("DROP TABLE IF EXISTS {}", table.quoted())
}

/// `INSERT INTO ... VALUES` statements holding at most `batch_rows` rows each.
/// An empty frame needs none.
///
/// # Errors
///
/// Returns a data processing error if a column cannot be rendered.
pub fn insert_statements(
    table: &TableName,
    df: &DataFrame,
    batch_rows: usize,
) -> Result<Vec<String>> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(Vec::new());
    }

    let rendered = df
        .get_columns()
        .iter()
        .map(|c| render_column(c.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;

    let header = format!("INSERT INTO {} ({}) VALUES ", table.quoted(), column_list(df));
    let rows: Vec<String> = (0..df.height())
        .map(|row| {
            let cells: Vec<&str> = rendered
                .iter()
                .map(|column| column.get(row).map_or("NULL", String::as_str))
                .collect();
            format!("({})", cells.join(", "))
        })
        .collect();

    Ok(rows
        .chunks(batch_rows.max(1))
        .map(|batch| format!("{header}{}", batch.join(", ")))
        .collect())
}
