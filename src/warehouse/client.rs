//! Databricks SQL Statement Execution API client.
//!
//! Statements are submitted in `JSON_ARRAY` format. The API waits up to
//! `wait_timeout` for a result; statements still pending after that are
//! polled until they finish, and result chunks are followed through
//! `next_chunk_index`.
//!
//! Table reads use `EXTERNAL_LINKS` disposition: each chunk is downloaded from
//! its presigned URL, so a read is not bound by the 25 MiB inline limit.
//! Everything else is small and stays `INLINE`.

use super::frame;
use super::statement::{
    ColumnInfo, Disposition, ResultChunk, ServiceError, StatementRequest, StatementResponse,
    StatementState,
};
use super::{Connector, TableName, Warehouse};
use crate::config::ConnectionSettings;
use crate::error::{CleanupError, Result, ResultExt as _};
use polars::prelude::DataFrame;
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

type Rows = Vec<Vec<Option<String>>>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Delay between status polls of a running statement
    pub poll_interval: Duration,

    /// Server-side wait before a statement is returned as pending (5 to 50 s)
    pub wait_timeout: Duration,

    /// Rows per `INSERT` statement when writing a table
    pub insert_batch_rows: usize,

    /// Timeout for a single HTTP request
    pub request_timeout: Duration,

    /// Base URL used instead of `https://<host>`
    pub endpoint: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            wait_timeout: Duration::from_secs(30),
            insert_batch_rows: 500,
            request_timeout: Duration::from_secs(120),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabricksConnector {
    options: ClientOptions,
}

impl DatabricksConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl Connector for DatabricksConnector {
    type Session = DatabricksSession;

    async fn connect(&self, settings: &ConnectionSettings) -> Result<DatabricksSession> {
        DatabricksSession::open(settings, self.options.clone()).await
    }
}

/// Rows and schema of a finished statement.
struct QueryResult {
    columns: Vec<ColumnInfo>,
    rows: Rows,
}

/// Check the status, then decode the body.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ServiceError>(&body)
            .map(|e| e.describe())
            .unwrap_or(body);
        return Err(CleanupError::Warehouse(format!("HTTP {status}: {detail}")));
    }

    Ok(response.json().await?)
}

/// A session bound to one SQL warehouse.
#[derive(Debug)]
pub struct DatabricksSession {
    http: reqwest::Client,
    statements_url: String,
    warehouse_id: String,
    token: SecretString,
    options: ClientOptions,

    /// Declared `DECIMAL` types of columns read so far, reused on write.
    decimals: RefCell<HashMap<String, String>>,
}

impl DatabricksSession {
    /// Build the client and run a `SELECT 1` connection check.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP path does not name a warehouse
    /// (before any request is made), and a warehouse error if the check fails.
    pub async fn open(settings: &ConnectionSettings, options: ClientOptions) -> Result<Self> {
        let warehouse_id = settings.warehouse_id()?.to_owned();
        let base_url = match &options.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
            None => settings.base_url(),
        };

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!(
            "Connecting to Databricks at {base_url} (warehouse {warehouse_id}, cluster {})",
            settings.cluster_id
        );

        let session = Self {
            http,
            statements_url: format!("{base_url}{STATEMENTS_PATH}"),
            warehouse_id,
            token: settings.token.clone(),
            options,
            decimals: RefCell::default(),
        };

        session
            .execute("SELECT 1", Disposition::Inline)
            .await
            .context("Databricks connection check failed")?;
        info!("Connected to Databricks");

        Ok(session)
    }

    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        decode(response).await
    }

    async fn execute(&self, sql: &str, disposition: Disposition) -> Result<QueryResult> {
        let request = StatementRequest::new(
            sql,
            &self.warehouse_id,
            disposition,
            self.options.wait_timeout.as_secs(),
        );
        let mut response: StatementResponse = self
            .send(self.http.post(&self.statements_url).json(&request))
            .await?;

        while response.status.state.is_in_flight() {
            debug!(
                "Statement {} is {:?}, polling again",
                response.statement_id, response.status.state
            );
            tokio::time::sleep(self.options.poll_interval).await;
            let url = format!("{}/{}", self.statements_url, response.statement_id);
            response = self.send(self.http.get(url)).await?;
        }

        if response.status.state != StatementState::Succeeded {
            let detail = response.status.error.unwrap_or_default().describe();
            return Err(CleanupError::Warehouse(format!(
                "Statement {} {:?}: {detail}",
                response.statement_id, response.status.state
            )));
        }

        let columns = match response.manifest {
            Some(manifest) => {
                if let Some(total) = manifest.total_row_count {
                    debug!("Statement {} returned {total} rows", response.statement_id);
                }
                manifest.schema.columns
            }
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        let mut next = self
            .collect_chunk(response.result.unwrap_or_default(), &mut rows)
            .await?;
        while let Some(index) = next {
            let url = format!(
                "{}/{}/result/chunks/{index}",
                self.statements_url, response.statement_id
            );
            let chunk: ResultChunk = self.send(self.http.get(url)).await?;
            debug!("Fetched result chunk {index}");
            next = self.collect_chunk(chunk, &mut rows).await?;
        }

        Ok(QueryResult { columns, rows })
    }

    /// Append a chunk's rows, inline or downloaded, and return the next index.
    async fn collect_chunk(&self, chunk: ResultChunk, rows: &mut Rows) -> Result<Option<usize>> {
        let next = chunk.next_index();
        rows.extend(chunk.data_array);

        // Presigned URLs carry their own credentials; no bearer token.
        for link in &chunk.external_links {
            let mut request = self.http.get(&link.external_link);
            for (name, value) in &link.http_headers {
                request = request.header(name, value);
            }
            let data: Rows = decode(request.send().await?)
                .await
                .with_context(|| format!("Failed to download result chunk {}", link.chunk_index))?;
            debug!("Downloaded result chunk {} ({} rows)", link.chunk_index, data.len());
            rows.extend(data);
        }
        Ok(next)
    }

    async fn stage_and_swap(
        &self,
        table: &TableName,
        staging: &TableName,
        create: &str,
        inserts: &[String],
    ) -> Result<()> {
        self.execute(create, Disposition::Inline)
            .await
            .with_context(|| format!("Failed to create {staging}"))?;

        let batches = inserts.len();
        for (i, insert) in inserts.iter().enumerate() {
            self.execute(insert, Disposition::Inline)
                .await
                .with_context(|| format!("Failed to insert batch {}/{batches} into {staging}", i + 1))?;
        }

        self.execute(&frame::replace_from_sql(table, staging), Disposition::Inline)
            .await
            .with_context(|| format!("Failed to replace {table} from {staging}"))?;
        Ok(())
    }
}

impl Warehouse for DatabricksSession {
    async fn read_table(&self, table: &TableName) -> Result<DataFrame> {
        let result = self
            .execute(
                &format!("SELECT * FROM {}", table.quoted()),
                Disposition::ExternalLinks,
            )
            .await
            .with_context(|| format!("Failed to read {table}"))?;

        let df = frame::frame_from_rows(&result.columns, &result.rows)?;
        self.decimals
            .borrow_mut()
            .extend(frame::decimal_columns(&result.columns));
        Ok(df)
    }

    async fn overwrite_table(&self, table: &TableName, df: &DataFrame) -> Result<()> {
        let staging = table.staging();
        let create = frame::create_table_sql(&staging, df, &self.decimals.borrow())?;
        let inserts = frame::insert_statements(&staging, df, self.options.insert_batch_rows)?;

        let outcome = self.stage_and_swap(table, &staging, &create, &inserts).await;

        if let Err(e) = self
            .execute(&frame::drop_table_sql(&staging), Disposition::Inline)
            .await
        {
            warn!("Failed to drop staging table {staging}: {e}");
        }
        outcome?;

        info!(
            "Wrote {} rows to {table} in {} batches",
            df.height(),
            inserts.len()
        );
        Ok(())
    }

    async fn close(self) -> Result<()> {
        // Statements are stateless; dropping the client releases its pool.
        info!("Closed Databricks session (warehouse {})", self.warehouse_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;
    use polars::prelude::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader};
    use tokio::net::TcpListener;

    /// One request as the local server saw it.
    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        authorization: Option<String>,
        body: String,
    }

    impl Seen {
        fn statement(&self) -> String {
            let json: serde_json::Value = serde_json::from_str(&self.body).unwrap();
            json["statement"].as_str().unwrap().to_owned()
        }
    }

    /// Answers one connection per reply, in order, with `Connection: close`.
    fn serve(listener: TcpListener, replies: Vec<(u16, String)>) -> Arc<Mutex<Vec<Seen>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, reply) in replies {
                let (stream, _) = listener.accept().await.unwrap();
                let mut stream = BufReader::new(stream);

                let mut request_line = String::new();
                stream.read_line(&mut request_line).await.unwrap();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_owned();
                let path = parts.next().unwrap_or_default().to_owned();

                let mut length = 0;
                let mut authorization = None;
                loop {
                    let mut header = String::new();
                    stream.read_line(&mut header).await.unwrap();
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        match name.to_ascii_lowercase().as_str() {
                            "content-length" => length = value.trim().parse().unwrap(),
                            "authorization" => authorization = Some(value.trim().to_owned()),
                            _ => {}
                        }
                    }
                }
                let mut body = vec![0; length];
                stream.read_exact(&mut body).await.unwrap();

                log.lock().unwrap().push(Seen {
                    method,
                    path,
                    authorization,
                    body: String::from_utf8(body).unwrap(),
                });

                let response = format!(
                    "HTTP/1.1 {status} Reply\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                    reply.len()
                );
                let stream = stream.get_mut();
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });
        seen
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn settings(http_path: &str) -> ConnectionSettings {
        ConnectionSettings {
            host: "adb-1.azuredatabricks.net".to_owned(),
            token: SecretString::new("dapi-x".into()),
            cluster_id: "0101-abc".to_owned(),
            http_path: http_path.to_owned(),
        }
    }

    fn connector(base: &str) -> DatabricksConnector {
        DatabricksConnector::new(ClientOptions {
            poll_interval: Duration::from_millis(5),
            endpoint: Some(base.to_owned()),
            ..ClientOptions::default()
        })
    }

    fn ok(body: &str) -> (u16, String) {
        (200, body.to_owned())
    }

    fn state(id: &str, state: &str) -> (u16, String) {
        ok(&format!(r#"{{"statement_id": "{id}", "status": {{"state": "{state}"}}}}"#))
    }

    fn connection_check() -> (u16, String) {
        ok(r#"{
            "statement_id": "s0",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "1", "type_name": "INT", "position": 0}]}},
            "result": {"data_array": [["1"]]}
        }"#)
    }

    const CLAIMS_COLUMNS: &str = r#"{"columns": [
        {"name": "claim_id", "type_name": "STRING", "position": 0},
        {"name": "totl_billd_amt", "type_name": "DECIMAL", "type_text": "DECIMAL(12,2)", "position": 1}
    ]}"#;

    fn warehouse_path() -> ConnectionSettings {
        settings("/sql/1.0/warehouses/wh1")
    }

    #[tokio::test]
    async fn test_open_rejects_cluster_path_before_io() {
        let err = DatabricksConnector::default()
            .connect(&settings("sql/protocolv1/o/1/0101-abc"))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(1));
        assert_eq!(options.wait_timeout, Duration::from_secs(30));
        assert_eq!(options.insert_batch_rows, 500);
        assert!(options.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_read_polls_and_downloads_every_chunk() -> anyhow::Result<()> {
        let (listener, base) = listener().await;
        let seen = serve(
            listener,
            vec![
                connection_check(),
                state("s1", "PENDING"),
                state("s1", "RUNNING"),
                ok(&format!(
                    r#"{{
                        "statement_id": "s1",
                        "status": {{"state": "SUCCEEDED"}},
                        "manifest": {{"schema": {CLAIMS_COLUMNS}, "total_row_count": 3}},
                        "result": {{"external_links": [
                            {{"chunk_index": 0, "external_link": "{base}/files/0", "next_chunk_index": 1}}
                        ]}}
                    }}"#
                )),
                ok(r#"[["C1", "100.25"], ["C2", null]]"#),
                ok(&format!(
                    r#"{{"external_links": [{{"chunk_index": 1, "external_link": "{base}/files/1"}}]}}"#
                )),
                ok(r#"[["C3", "7.50"]]"#),
            ],
        );

        let session = connector(&base).connect(&warehouse_path()).await?;
        let table = TableName::new("workspace", "feature_store_project", "fct_claim");
        let df = session.read_table(&table).await?;

        assert_eq!(df.height(), 3);
        let amounts: Vec<Option<f64>> = df
            .column("totl_billd_amt")?
            .as_materialized_series()
            .f64()?
            .into_iter()
            .collect();
        assert_eq!(amounts, vec![Some(100.25), None, Some(7.5)]);

        let seen = seen.lock().unwrap().clone();
        let requests: Vec<(&str, &str)> = seen
            .iter()
            .map(|s| (s.method.as_str(), s.path.as_str()))
            .collect();
        assert_eq!(
            requests,
            vec![
                ("POST", "/api/2.0/sql/statements"),
                ("POST", "/api/2.0/sql/statements"),
                ("GET", "/api/2.0/sql/statements/s1"),
                ("GET", "/api/2.0/sql/statements/s1"),
                ("GET", "/files/0"),
                ("GET", "/api/2.0/sql/statements/s1/result/chunks/1"),
                ("GET", "/files/1"),
            ]
        );

        let read: serde_json::Value = serde_json::from_str(&seen[1].body)?;
        assert_eq!(read["disposition"], "EXTERNAL_LINKS");
        assert_eq!(read["warehouse_id"], "wh1");
        assert_eq!(
            read["statement"],
            "SELECT * FROM `workspace`.`feature_store_project`.`fct_claim`"
        );

        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer dapi-x"));
        assert_eq!(seen[5].authorization.as_deref(), Some("Bearer dapi-x"));
        assert!(seen[4].authorization.is_none(), "presigned download must not carry the token");
        assert!(seen[6].authorization.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_body_is_described() {
        let (listener, base) = listener().await;
        let _seen = serve(
            listener,
            vec![(
                403,
                r#"{"error_code": "PERMISSION_DENIED", "message": "Invalid access token."}"#
                    .to_owned(),
            )],
        );

        let err = connector(&base).connect(&warehouse_path()).await.unwrap_err();

        assert!(err.is_warehouse());
        let message = err.to_string();
        assert!(message.contains("HTTP 403"), "{message}");
        assert!(message.contains("PERMISSION_DENIED: Invalid access token."), "{message}");
    }

    #[tokio::test]
    async fn test_failed_statement_is_warehouse_error() -> anyhow::Result<()> {
        let (listener, base) = listener().await;
        let _seen = serve(
            listener,
            vec![
                connection_check(),
                ok(r#"{
                    "statement_id": "s2",
                    "status": {
                        "state": "FAILED",
                        "error": {
                            "error_code": "BAD_REQUEST",
                            "message": "[TABLE_OR_VIEW_NOT_FOUND] The table or view cannot be found."
                        }
                    }
                }"#),
            ],
        );

        let session = connector(&base).connect(&warehouse_path()).await?;
        let err = session
            .read_table(&TableName::new("c", "s", "fct_claim"))
            .await
            .unwrap_err();

        assert!(err.is_warehouse());
        let message = err.to_string();
        assert!(message.contains("Failed to read c.s.fct_claim"), "{message}");
        assert!(message.contains("TABLE_OR_VIEW_NOT_FOUND"), "{message}");
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_stages_then_swaps() -> anyhow::Result<()> {
        let (listener, base) = listener().await;
        let seen = serve(
            listener,
            vec![
                connection_check(),
                ok(&format!(
                    r#"{{
                        "statement_id": "s1",
                        "status": {{"state": "SUCCEEDED"}},
                        "manifest": {{"schema": {CLAIMS_COLUMNS}}},
                        "result": {{"external_links": [
                            {{"chunk_index": 0, "external_link": "{base}/files/0"}}
                        ]}}
                    }}"#
                )),
                ok(r#"[["C1", "100.25"]]"#),
                state("s2", "SUCCEEDED"),
                state("s3", "SUCCEEDED"),
                state("s4", "SUCCEEDED"),
                state("s5", "SUCCEEDED"),
            ],
        );

        let session = connector(&base).connect(&warehouse_path()).await?;
        let df = session.read_table(&TableName::new("c", "s", "fct_claim")).await?;
        session
            .overwrite_table(&TableName::new("c", "s", "cleaned_claims"), &df)
            .await?;

        let seen = seen.lock().unwrap().clone();
        let statements: Vec<String> = seen[3..].iter().map(Seen::statement).collect();
        assert_eq!(
            statements,
            vec![
                "CREATE OR REPLACE TABLE `c`.`s`.`cleaned_claims__staging` \
                 (`claim_id` STRING, `totl_billd_amt` DECIMAL(12,2)) USING DELTA",
                "INSERT INTO `c`.`s`.`cleaned_claims__staging` (`claim_id`, `totl_billd_amt`) \
                 VALUES ('C1', 100.25)",
                "CREATE OR REPLACE TABLE `c`.`s`.`cleaned_claims` USING DELTA \
                 AS SELECT * FROM `c`.`s`.`cleaned_claims__staging`",
                "DROP TABLE IF EXISTS `c`.`s`.`cleaned_claims__staging`",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_destination_untouched() -> anyhow::Result<()> {
        let (listener, base) = listener().await;
        let seen = serve(
            listener,
            vec![
                connection_check(),
                state("s1", "SUCCEEDED"),
                state("s2", "FAILED"),
                state("s3", "SUCCEEDED"),
            ],
        );

        let session = connector(&base).connect(&warehouse_path()).await?;
        let df = DataFrame::new(vec![Column::from(Series::new("id".into(), vec![1i64, 2]))])?;
        let err = session
            .overwrite_table(&TableName::new("c", "s", "cleaned_claims"), &df)
            .await
            .unwrap_err();

        assert!(err.is_warehouse());
        assert!(err.to_string().contains("insert batch 1/1"), "{err}");

        let seen = seen.lock().unwrap().clone();
        let statements: Vec<String> = seen[1..].iter().map(Seen::statement).collect();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE OR REPLACE TABLE `c`.`s`.`cleaned_claims__staging`"));
        assert!(statements[1].starts_with("INSERT INTO `c`.`s`.`cleaned_claims__staging`"));
        assert_eq!(
            statements[2],
            "DROP TABLE IF EXISTS `c`.`s`.`cleaned_claims__staging`"
        );
        Ok(())
    }
}
