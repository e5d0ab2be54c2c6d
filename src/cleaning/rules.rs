//! Cleaning rule configuration.
//!
//! The defaults reproduce the claims cleanup. A JSON file can override any
//! field; missing fields fall back to the defaults.

use crate::error::{CleanupError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MISSING_THRESHOLD: f64 = 0.40;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Parameters for the ordered cleaning pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    /// Columns whose null fraction is strictly above this are dropped (0.0..=1.0)
    pub missing_threshold: f64,

    /// Columns always dropped when present (identifiers with no analytic value)
    pub drop_columns: Vec<String>,

    /// Columns coerced to datetimes; unparseable values become null
    pub date_columns: Vec<String>,

    /// Date back-fills, applied in order
    pub date_imputations: Vec<DateImputation>,

    /// Constant fills for categorical columns
    pub categorical_fills: Vec<CategoricalFill>,

    /// IQR fence applied to a single numeric column
    pub outlier_filter: Option<OutlierFilter>,

    /// Remove exact duplicate rows, keeping the first occurrence
    pub drop_duplicates: bool,
}

/// Fill nulls in `target` with `source + offset_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateImputation {
    pub target: String,
    pub source: String,
    pub offset_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalFill {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    pub column: String,
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
            drop_columns: vec!["authzn_id".to_owned()],
            date_columns: vec![
                "pd_dt".to_owned(),
                "clm_adjud_ts".to_owned(),
                "clm_sys_cret_dt".to_owned(),
            ],
            date_imputations: vec![
                DateImputation {
                    target: "pd_dt".to_owned(),
                    source: "clm_sys_cret_dt".to_owned(),
                    offset_days: 2,
                },
                DateImputation {
                    target: "clm_adjud_ts".to_owned(),
                    source: "pd_dt".to_owned(),
                    offset_days: -2,
                },
            ],
            categorical_fills: vec![CategoricalFill {
                column: "procsr_apprv_pay_by_nm".to_owned(),
                value: "unknown".to_owned(),
            }],
            outlier_filter: Some(OutlierFilter {
                column: "totl_billd_amt".to_owned(),
                iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            }),
            drop_duplicates: true,
        }
    }
}

impl CleaningRules {
    /// Load rules from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes invalid rules.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cleaning rules {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid cleaning rules in {}", path.display()))
    }

    /// Parse rules from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed or the rules fail
    /// [`CleaningRules::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Self = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check that thresholds are in range and column names are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !self.missing_threshold.is_finite() || !(0.0..=1.0).contains(&self.missing_threshold)
        {
            return Err(CleanupError::Config(format!(
                "missing_threshold must be a fraction between 0 and 1, got {}",
                self.missing_threshold
            )));
        }

        let names = self
            .drop_columns
            .iter()
            .chain(&self.date_columns)
            .chain(
                self.date_imputations
                    .iter()
                    .flat_map(|rule| [&rule.target, &rule.source]),
            )
            .chain(self.categorical_fills.iter().map(|fill| &fill.column))
            .chain(self.outlier_filter.iter().map(|filter| &filter.column));
        for name in names {
            if name.trim().is_empty() {
                return Err(CleanupError::Config(
                    "cleaning rules contain an empty column name".to_owned(),
                ));
            }
        }

        if let Some(filter) = &self.outlier_filter
            && (!filter.iqr_multiplier.is_finite() || filter.iqr_multiplier < 0.0)
        {
            return Err(CleanupError::Config(format!(
                "iqr_multiplier must be a non-negative number, got {}",
                filter.iqr_multiplier
            )));
        }

        Ok(())
    }
}

fn default_iqr_multiplier() -> f64 {
    DEFAULT_IQR_MULTIPLIER
}
