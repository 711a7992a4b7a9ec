//! HTTP implementation of the warehouse API surface
//!
//! Talks to the documented REST endpoints directly and works on raw JSON
//! in and rows out - no generated client, no intermediate representation.

use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

use tablewatch_config::WarehouseConfig;

use super::{JobSpec, ResultsPage, SubmitAck, TableMeta, WarehouseApi};
use crate::Row;
use crate::convert::as_i64;
use crate::error::ProbeError;
use crate::retry::{RetryPolicy, execute_with_retry};

/// Warehouse API client over HTTP/JSON
pub struct HttpWarehouseClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpWarehouseClient {
    /// Create a client from config
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client construction fails (TLS or proxy
    /// misconfiguration).
    pub fn new(config: &WarehouseConfig) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent("tablewatch/0.1")
            .timeout(config.request_timeout())
            .build()
            .map_err(ProbeError::Http)?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: std::time::Duration::from_millis(config.retry_base_delay_ms),
            },
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

/// Map a non-success response to the probe error taxonomy
async fn error_for(response: reqwest::Response, context: &str) -> ProbeError {
    let status = response.status();
    let message = body_snippet(response).await;
    match status {
        StatusCode::NOT_FOUND => ProbeError::NotFound(context.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProbeError::Auth {
            context: context.to_string(),
            message,
        },
        _ => ProbeError::Backend {
            context: context.to_string(),
            status: Some(status.as_u16()),
            message,
        },
    }
}

async fn body_snippet(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect()
}

fn malformed(context: &str, detail: &str) -> ProbeError {
    ProbeError::Backend {
        context: context.to_string(),
        status: None,
        message: format!("malformed response: {detail}"),
    }
}

/// Parse a millisecond timestamp cell that may be a string or number
fn parse_ms(value: &Value, context: &str, field: &str) -> Result<i64, ProbeError> {
    as_i64(value).ok_or_else(|| malformed(context, &format!("missing or non-numeric {field}")))
}

/// Flatten the wire row shape `{"f": [{"v": ...}, ...]}` into cells
fn parse_wire_rows(body: &Value) -> Vec<Row> {
    let Some(rows) = body.get("rows").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.get("f")
                .and_then(Value::as_array)
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| cell.get("v").cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

#[async_trait::async_trait]
impl WarehouseApi for HttpWarehouseClient {
    async fn get_table(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<TableMeta, ProbeError> {
        let context = format!("{project}:{dataset}.{table}");
        let url = format!(
            "{}/projects/{project}/datasets/{dataset}/tables/{table}",
            self.api_url
        );

        execute_with_retry(&self.retry, "get_table", || async {
            let response = self.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(error_for(response, &context).await);
            }

            let body: Value = response.json().await?;
            Ok(TableMeta {
                id: body
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(&context)
                    .to_string(),
                creation_time: parse_ms(
                    body.get("creationTime").unwrap_or(&Value::Null),
                    &context,
                    "creationTime",
                )?,
                last_modified_time: parse_ms(
                    body.get("lastModifiedTime").unwrap_or(&Value::Null),
                    &context,
                    "lastModifiedTime",
                )?,
                location: body
                    .get("location")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                num_bytes: body.get("numBytes").and_then(as_i64).unwrap_or(0),
                num_rows: body.get("numRows").and_then(as_i64).unwrap_or(0),
            })
        })
        .await
    }

    async fn submit_query(&self, project: &str, job: &JobSpec) -> Result<SubmitAck, ProbeError> {
        let context = format!("{project} job {}", job.job_id);
        let url = format!("{}/projects/{project}/jobs", self.api_url);
        let body = json!({
            "jobReference": { "projectId": project, "jobId": job.job_id },
            "configuration": {
                "query": { "query": job.sql, "dryRun": job.dry_run }
            }
        });

        debug!(project, job_id = %job.job_id, dry_run = job.dry_run, "submitting job");
        let response = self.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(error_for(response, &context).await);
        }

        let body: Value = response.json().await?;
        let stats = body.pointer("/statistics/query");
        Ok(SubmitAck {
            total_bytes_processed: stats
                .and_then(|s| s.get("totalBytesProcessed"))
                .and_then(as_i64),
            cache_hit: stats.and_then(|s| s.get("cacheHit")).and_then(Value::as_bool),
        })
    }

    async fn poll_job(
        &self,
        project: &str,
        job_id: &str,
        start_index: Option<u64>,
    ) -> Result<ResultsPage, ProbeError> {
        let context = format!("{project} job {job_id}");
        let mut url = format!(
            "{}/projects/{project}/queries/{job_id}?timeoutMs=0",
            self.api_url
        );
        if let Some(index) = start_index {
            url.push_str(&format!("&startIndex={index}"));
        }

        execute_with_retry(&self.retry, "poll_job", || async {
            let response = self.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(error_for(response, &context).await);
            }

            let body: Value = response.json().await?;
            if let Some(error_result) = body.pointer("/status/errorResult") {
                return Err(malformed(&context, &error_result.to_string()));
            }

            let complete = body
                .get("jobComplete")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let total_rows = body
                .get("totalRows")
                .and_then(as_i64)
                .and_then(|n| u64::try_from(n).ok());

            Ok(ResultsPage {
                complete,
                rows: parse_wire_rows(&body),
                total_rows,
            })
        })
        .await
    }
}
