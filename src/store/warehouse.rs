//! Cold store client: the authoritative data warehouse.
//!
//! The warehouse is the slowest tier and the only source of truth; every
//! query against it is billed, so the orchestrator goes to great lengths to
//! avoid calling [`ColdStore::run_query`]. Failures are not retried here —
//! retry policy belongs to the caller.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::table::ResultTable;

#[derive(Error, Debug)]
pub enum ColdStoreError {
    #[error("warehouse request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("warehouse returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("warehouse response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The cold-store seam. One implementation per warehouse vendor; tests mock
/// it to count invocations.
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Run a canonical query and return its columnar result.
    async fn run_query(&self, sql: &str) -> Result<ResultTable, ColdStoreError>;
}

/// HTTP adapter for warehouses exposing a JSON query endpoint.
///
/// POSTs `{"query": "<sql>"}` to `{endpoint}/v1/query` and expects a
/// [`ResultTable`] JSON body back.
pub struct HttpColdStore {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpColdStore {
    pub fn new(endpoint: String, timeout: std::time::Duration) -> Result<Self, ColdStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ColdStore for HttpColdStore {
    async fn run_query(&self, sql: &str) -> Result<ResultTable, ColdStoreError> {
        let url = format!("{}/v1/query", self.endpoint.trim_end_matches('/'));
        debug!(url, sql, "Issuing warehouse query");

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": sql }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ColdStoreError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.bytes().await?;
        let table: ResultTable = serde_json::from_slice(&body)?;

        info!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Warehouse query complete"
        );
        Ok(table)
    }
}
