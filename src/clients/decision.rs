//! Decision API client.
//!
//! The external service that announces demand-response windows and receives
//! participation outcomes. Failures are surfaced as typed errors and never
//! retried inside a run; the next trigger firing is the retry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devices::DeviceClass;
use crate::error::DecisionApiError;

/// A demand-response event window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Returns `true` when `now` falls within `[start, end)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now < self.end
    }
}

/// A device's opt-in decision, posted back after scheduling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationOutcome {
    pub device_id: String,
    pub opted_in: bool,
}

/// External demand-response decision service.
#[async_trait]
pub trait DecisionApi: Send + Sync {
    /// The currently active or upcoming window for a class and tenant, if
    /// one has been announced.
    async fn get_active_window(
        &self,
        class: DeviceClass,
        tenant: &str,
    ) -> Result<Option<Window>, DecisionApiError>;

    /// Reports the opt-in decisions taken for a window. Best effort; the
    /// scheduler logs a failure and moves on.
    async fn report_outcomes(
        &self,
        class: DeviceClass,
        tenant: &str,
        outcomes: &[ParticipationOutcome],
    ) -> Result<(), DecisionApiError>;
}

#[derive(Debug, Deserialize)]
struct WindowResponse {
    window: Option<Window>,
}

#[derive(Debug, Serialize)]
struct OutcomesRequest<'a> {
    tenant: &'a str,
    outcomes: &'a [ParticipationOutcome],
}

/// HTTP implementation of [`DecisionApi`].
#[derive(Debug, Clone)]
pub struct HttpDecisionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDecisionApi {
    /// Builds the client with a hard request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionApiError::Http`] if the underlying client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DecisionApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DecisionApi for HttpDecisionApi {
    async fn get_active_window(
        &self,
        class: DeviceClass,
        tenant: &str,
    ) -> Result<Option<Window>, DecisionApiError> {
        let url = format!("{}/windows/{}", self.base_url, class.as_str());
        debug!(url, tenant, "querying decision api for active window");

        let response = self
            .client
            .get(&url)
            .query(&[("tenant", tenant)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecisionApiError::Status(status.as_u16()));
        }

        let body: WindowResponse = response
            .json()
            .await
            .map_err(|e| DecisionApiError::InvalidResponse(e.to_string()))?;

        if let Some(window) = body.window
            && window.end < window.start
        {
            return Err(DecisionApiError::InvalidResponse(format!(
                "window end {} precedes start {}",
                window.end, window.start
            )));
        }

        Ok(body.window)
    }

    async fn report_outcomes(
        &self,
        class: DeviceClass,
        tenant: &str,
        outcomes: &[ParticipationOutcome],
    ) -> Result<(), DecisionApiError> {
        let url = format!("{}/outcomes/{}", self.base_url, class.as_str());
        debug!(url, tenant, count = outcomes.len(), "posting outcomes");

        let response = self
            .client
            .post(&url)
            .json(&OutcomesRequest { tenant, outcomes })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecisionApiError::Status(status.as_u16()));
        }
        Ok(())
    }
}
