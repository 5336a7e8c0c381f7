//! Telemetry sink client.
//!
//! The sink is at-least-once and partial-failure tolerant: a batch submit
//! returns one outcome per entry, and rejected entries are recorded against
//! their device rather than failing the run.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devices::PropertyValue;
use crate::error::SinkError;

/// One property update bound for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkEntry {
    /// Batch-unique id, echoed back in error responses.
    pub entry_id: String,
    pub asset_id: String,
    pub property_id: String,
    pub value: PropertyValue,
    /// Epoch seconds.
    pub time_in_seconds: i64,
}

/// Per-entry result of a batch submit.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
    pub entry_id: String,
    pub accepted: bool,
    pub message: Option<String>,
}

/// External telemetry ingestion endpoint.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Submits a batch of property updates.
    ///
    /// # Errors
    ///
    /// [`SinkError`] only when the whole batch fails (transport, endpoint
    /// status, malformed response). Per-entry rejections come back as
    /// outcomes with `accepted == false`.
    async fn submit_batch(&self, entries: Vec<SinkEntry>) -> Result<Vec<EntryOutcome>, SinkError>;
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    entries: Vec<SinkEntry>,
}

/// Entries the endpoint rejected; everything not listed was accepted.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    error_entries: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    entry_id: String,
    message: String,
}

/// HTTP implementation of [`TelemetrySink`].
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetrySink {
    /// Builds the client with a hard request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Http`] if the underlying client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn submit_batch(&self, entries: Vec<SinkEntry>) -> Result<Vec<EntryOutcome>, SinkError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/batch-properties", self.base_url);
        debug!(url, entries = entries.len(), "submitting telemetry batch");

        let response = self
            .client
            .post(&url)
            .json(&BatchRequest {
                entries: entries.clone(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| SinkError::InvalidResponse(e.to_string()))?;

        Ok(outcomes_from_errors(&entries, &body.error_entries))
    }
}

fn outcomes_from_errors(entries: &[SinkEntry], errors: &[ErrorEntry]) -> Vec<EntryOutcome> {
    entries
        .iter()
        .map(|entry| {
            let rejection = errors.iter().find(|e| e.entry_id == entry.entry_id);
            EntryOutcome {
                entry_id: entry.entry_id.clone(),
                accepted: rejection.is_none(),
                message: rejection.map(|e| e.message.clone()),
            }
        })
        .collect()
}
