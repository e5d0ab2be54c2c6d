//! Run configuration read from the environment.
//!
//! Every reader takes a lookup function rather than touching the process
//! environment directly, so tests can pass a map. Empty values are treated as
//! unset.

use crate::cleaning::CleaningRules;
use crate::error::{CleanupError, Result};
use crate::warehouse::TableName;
use secrecy::SecretString;
use std::path::PathBuf;

pub const HOST_VAR: &str = "DATABRICKS_HOST";
pub const TOKEN_VAR: &str = "DATABRICKS_TOKEN";
pub const CLUSTER_ID_VAR: &str = "DATABRICKS_CLUSTER_ID";
pub const HTTP_PATH_VAR: &str = "DATABRICKS_HTTP_PATH";
pub const CATALOG_VAR: &str = "DATABRICKS_CATALOG";
pub const SCHEMA_VAR: &str = "DATABRICKS_SCHEMA";
pub const RULES_VAR: &str = "CLAIMS_CLEANUP_RULES";
pub const LOG_DIR_VAR: &str = "CLAIMS_CLEANUP_LOG_DIR";

pub const DEFAULT_CATALOG: &str = "workspace";
pub const DEFAULT_SCHEMA: &str = "feature_store_project";

pub const SOURCE_TABLE: &str = "fct_claim";
pub const CLEANED_TABLE: &str = "cleaned_claims";
pub const FEATURE_TABLE: &str = "fct_claim_features_after_datacleanup";

/// Reads a variable from the process environment, treating empty as unset.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// The four parameters needed to open a session.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub token: SecretString,
    pub cluster_id: String,
    pub http_path: String,
}

impl ConnectionSettings {
    /// # Errors
    ///
    /// Returns a configuration error if any of the four variables is unset.
    /// The message names all four, not the one that is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = non_empty(&lookup, HOST_VAR);
        let token = non_empty(&lookup, TOKEN_VAR);
        let cluster_id = non_empty(&lookup, CLUSTER_ID_VAR);
        let http_path = non_empty(&lookup, HTTP_PATH_VAR);

        match (host, token, cluster_id, http_path) {
            (Some(host), Some(token), Some(cluster_id), Some(http_path)) => Ok(Self {
                host,
                token: SecretString::new(token.into()),
                cluster_id,
                http_path,
            }),
            _ => Err(CleanupError::Config(format!(
                "Missing one of {HOST_VAR}/{TOKEN_VAR}/{CLUSTER_ID_VAR}/{HTTP_PATH_VAR}"
            ))),
        }
    }

    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// `https://<host>` without a trailing slash, whatever form the host was
    /// given in.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        format!("https://{host}")
    }

    /// SQL warehouse id from an HTTP path such as `/sql/1.0/warehouses/<id>`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the path does not name a warehouse.
    pub fn warehouse_id(&self) -> Result<&str> {
        let mut segments = self.http_path.trim().trim_matches('/').rsplit('/');
        match (segments.next(), segments.next()) {
            (Some(id), Some("warehouses" | "endpoints")) if !id.is_empty() => Ok(id),
            _ => Err(CleanupError::Config(format!(
                "{HTTP_PATH_VAR} must be a SQL warehouse path (/sql/1.0/warehouses/<id>), \
                 not a cluster path; got {:?}",
                self.http_path
            ))),
        }
    }
}

/// Source and destination tables for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub source: TableName,
    pub cleaned: TableName,
    pub feature: TableName,
}

impl TableNames {
    pub fn in_schema(catalog: &str, schema: &str) -> Self {
        Self {
            source: TableName::new(catalog, schema, SOURCE_TABLE),
            cleaned: TableName::new(catalog, schema, CLEANED_TABLE),
            feature: TableName::new(catalog, schema, FEATURE_TABLE),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let catalog = non_empty(&lookup, CATALOG_VAR).unwrap_or_else(|| DEFAULT_CATALOG.to_owned());
        let schema = non_empty(&lookup, SCHEMA_VAR).unwrap_or_else(|| DEFAULT_SCHEMA.to_owned());
        Self::in_schema(&catalog, &schema)
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::in_schema(DEFAULT_CATALOG, DEFAULT_SCHEMA)
    }
}

/// Built-in claims rules, or the JSON file named by `CLAIMS_CLEANUP_RULES`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn rules_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<CleaningRules> {
    match non_empty(&lookup, RULES_VAR) {
        Some(path) => {
            tracing::info!("Loading cleaning rules from {path}");
            CleaningRules::from_file(path)
        }
        None => Ok(CleaningRules::default()),
    }
}

pub fn log_dir_override(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    non_empty(&lookup, LOG_DIR_VAR).map(PathBuf::from)
}
