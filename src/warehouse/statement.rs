//! Wire types for the SQL Statement Execution API (`/api/2.0/sql/statements`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where result rows are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum Disposition {
    /// In the response body; capped at 25 MiB per statement.
    Inline,
    /// As presigned URLs, one per chunk.
    ExternalLinks,
}

#[derive(Debug, Serialize)]
pub(super) struct StatementRequest<'a> {
    pub statement: &'a str,
    pub warehouse_id: &'a str,
    pub disposition: Disposition,
    pub format: &'static str,
    pub wait_timeout: String,
    pub on_wait_timeout: &'static str,
}

impl<'a> StatementRequest<'a> {
    pub fn new(
        statement: &'a str,
        warehouse_id: &'a str,
        disposition: Disposition,
        wait_secs: u64,
    ) -> Self {
        Self {
            statement,
            warehouse_id,
            disposition,
            format: "JSON_ARRAY",
            wait_timeout: format!("{wait_secs}s"),
            on_wait_timeout: "CONTINUE",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StatementResponse {
    pub statement_id: String,
    pub status: StatementStatus,
    #[serde(default)]
    pub manifest: Option<ResultManifest>,
    #[serde(default)]
    pub result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatementStatus {
    pub state: StatementState,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

impl StatementState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Error payload, both inside a statement status and as the body of a non-2xx
/// response.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ServiceError {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceError {
    pub fn describe(&self) -> String {
        match (&self.error_code, &self.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "no error details returned".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ResultManifest {
    pub schema: ResultSchema,
    #[serde(default)]
    pub total_row_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ResultSchema {
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    /// Full type, e.g. `DECIMAL(12,2)`
    #[serde(default)]
    pub type_text: Option<String>,
    #[serde(default)]
    pub position: usize,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ResultChunk {
    #[serde(default)]
    pub data_array: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub external_links: Vec<ExternalLink>,
    #[serde(default)]
    pub next_chunk_index: Option<usize>,
}

impl ResultChunk {
    /// Index of the chunk after this one, wherever the response put it.
    pub fn next_index(&self) -> Option<usize> {
        self.next_chunk_index.or_else(|| {
            self.external_links
                .iter()
                .filter_map(|link| link.next_chunk_index)
                .max()
        })
    }
}

/// A presigned URL holding one chunk as a `JSON_ARRAY` body.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ExternalLink {
    pub external_link: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub next_chunk_index: Option<usize>,
    /// Headers the storage service expects on the download.
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}
