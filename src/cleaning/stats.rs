use crate::error::Result;
use polars::prelude::*;
use serde::Serialize;

/// Tukey fence derived from the interquartile range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrFence {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFence {
    /// `[Q1 - k*IQR, Q3 + k*IQR]`
    pub fn from_quartiles(q1: f64, q3: f64, multiplier: f64) -> Self {
        let iqr = q3 - q1;
        Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Keeps values inside the fence. Nulls (and NaNs, see [`observed`]) fail it.
    pub fn keep_expr(&self, expr: Expr) -> Expr {
        expr.clone()
            .gt_eq(lit(self.lower))
            .and(expr.lt_eq(lit(self.upper)))
    }
}

/// A column as `f64` with NaN mapped to null, so it counts as unobserved.
pub fn observed(column: &str) -> Expr {
    let values = col(column).cast(DataType::Float64);
    when(values.clone().is_nan())
        .then(lit(NULL).cast(DataType::Float64))
        .otherwise(values)
}

/// Linear-interpolated Q1/Q3 fence over the observed values of `column`.
/// `None` when the column has no observed value.
pub fn iqr_fence(df: &DataFrame, column: &str, multiplier: f64) -> Result<Option<IqrFence>> {
    let quartiles = df
        .clone()
        .lazy()
        .select([
            observed(column)
                .quantile(lit(0.25), QuantileMethod::Linear)
                .alias("q1"),
            observed(column)
                .quantile(lit(0.75), QuantileMethod::Linear)
                .alias("q3"),
        ])
        .collect()?;

    let q1 = quartiles.column("q1")?.as_materialized_series().f64()?.get(0);
    let q3 = quartiles.column("q3")?.as_materialized_series().f64()?.get(0);
    Ok(match (q1, q3) {
        (Some(q1), Some(q3)) => Some(IqrFence::from_quartiles(q1, q3, multiplier)),
        _ => None,
    })
}
