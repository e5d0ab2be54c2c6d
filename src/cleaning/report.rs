//! Diagnostic counts collected while cleaning.

use super::stats::IqrFence;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,

    pub empty_rows_dropped: usize,
    pub sparse_columns_dropped: Vec<String>,
    pub columns_dropped: Vec<String>,

    /// Values per date column that were present but could not be parsed
    pub unparseable_dates: Vec<ColumnCount>,

    /// Values back-filled per date imputation, in rule order
    pub dates_imputed: Vec<ColumnCount>,
    pub categories_filled: Vec<ColumnCount>,

    pub outlier_fence: Option<IqrFence>,
    pub outliers_removed: usize,
    pub duplicates_removed: usize,

    /// Rules not applied because a column they need is absent
    pub skipped_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCount {
    pub column: String,
    pub count: usize,
}

impl ColumnCount {
    pub fn new(column: impl Into<String>, count: usize) -> Self {
        Self {
            column: column.into(),
            count,
        }
    }
}

impl CleaningReport {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows_before: rows,
            columns_before: columns,
            rows_after: rows,
            columns_after: columns,
            ..Default::default()
        }
    }

    pub(crate) fn skip(&mut self, rule: impl Into<String>) {
        let rule = rule.into();
        tracing::warn!("Skipping cleaning rule, column not present: {rule}");
        self.skipped_rules.push(rule);
    }

    /// One-line summary of the run.
    pub fn summary(&self) -> String {
        format!(
            "Cleaned {} → {} rows, {} → {} columns ({} empty rows, {} sparse columns, {} outliers, {} duplicates removed)",
            self.rows_before,
            self.rows_after,
            self.columns_before,
            self.columns_after,
            self.empty_rows_dropped,
            self.sparse_columns_dropped.len(),
            self.outliers_removed,
            self.duplicates_removed,
        )
    }
}
