//! Thin `reqwest` wrapper for the three calls the edge agent makes:
//! `POST /ingest`, `GET /device-policy` (conditional on `If-None-Match`),
//! and `POST /device-commands/{id}/ack`. Every call carries an explicit
//! timeout (spec.md §5); none of them retry internally — retry/backoff
//! is the scheduler's job (spec.md §4.1 step 2).

use std::time::Duration;

use chrono::{DateTime, Utc};
use ew_protocol::commands::{CommandAckRequest, PendingControlCommand};
use ew_protocol::policy::EdgePolicy;
use ew_protocol::telemetry::{IngestRequest, IngestResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CallOutcome;

/// `GET /device-policy`'s 200 body: the versioned policy document
/// flattened with the device-specific overrides and pending-command
/// fragment the server folds in alongside it (spec.md §4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevicePolicyResponse {
    #[serde(flatten)]
    pub policy: EdgePolicy,
    pub device_operation_mode: ew_protocol::device::OperationMode,
    pub device_sleep_poll_interval_s: u32,
    pub pending_control_command: Option<PendingControlCommand>,
}

pub struct EdgeHttpClient {
    client: reqwest::Client,
    base_url: String,
    device_token: String,
}

impl EdgeHttpClient {
    pub fn new(base_url: impl Into<String>, device_token: impl Into<String>, timeout_s: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self {
            client,
            base_url: base_url.into(),
            device_token: device_token.into(),
        }
    }

    /// `POST /ingest`. Returns the decoded response on 2xx,
    /// `ContractRejected` on 422, `ClientRejected` on any other 4xx,
    /// and `Transient` on network errors or 5xx.
    pub async fn post_ingest(&self, request: &IngestRequest) -> CallOutcome<IngestResponse> {
        let url = format!("{}/ingest", self.base_url);
        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.device_token)
            .json(request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "ingest POST failed (network)");
                return CallOutcome::Transient;
            }
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<IngestResponse>().await {
                Ok(body) => CallOutcome::Success(body),
                Err(e) => {
                    tracing::warn!(error = %e, "ingest response body did not decode");
                    CallOutcome::Transient
                }
            }
        } else if status.as_u16() == 422 {
            tracing::warn!("ingest batch rejected by contract (422)");
            CallOutcome::ContractRejected
        } else if status.is_client_error() {
            tracing::warn!(status = %status, "ingest batch rejected by server (4xx)");
            CallOutcome::ClientRejected { status: status.as_u16() }
        } else {
            tracing::warn!(status = %status, "ingest returned 5xx, will retry");
            CallOutcome::Transient
        }
    }

    /// `GET /device-policy` with `If-None-Match: <etag>` when a cached
    /// etag is available. `Ok(None)` on a 304.
    pub async fn get_device_policy(
        &self,
        cached_etag: Option<&str>,
    ) -> Result<Option<(DevicePolicyResponse, String)>, ()> {
        let url = format!("{}/device-policy", self.base_url);
        let mut request = self.client.get(&url).bearer_auth(&self.device_token);
        if let Some(etag) = cached_etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "device-policy GET failed (network)");
                return Err(());
            }
        };

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "device-policy GET returned non-2xx");
            return Err(());
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();

        match response.json::<DevicePolicyResponse>().await {
            Ok(body) => Ok(Some((body, etag))),
            Err(e) => {
                tracing::warn!(error = %e, "device-policy response body did not decode");
                Err(())
            }
        }
    }

    /// `POST /device-commands/{id}/ack`. The protocol is explicitly
    /// idempotent server-side, so the caller may call this repeatedly
    /// until it stops failing.
    pub async fn post_ack(&self, command_id: Uuid, applied: bool, error: Option<String>) -> bool {
        let url = format!("{}/device-commands/{}/ack", self.base_url, command_id);
        let body = CommandAckRequest { command_id, applied, error };
        match self
            .client
            .post(&url)
            .bearer_auth(&self.device_token)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "ack POST rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "ack POST failed (network)");
                false
            }
        }
    }
}

/// Compute the next backoff delay with full jitter (spec.md §4.1 step
/// 2): `random(0, min(max, initial * 2^attempt))`.
pub fn backoff_delay(attempt: u32, initial_s: f64, max_s: f64, jitter: f64) -> Duration {
    let exp = initial_s * 2f64.powi(attempt as i32);
    let capped = exp.min(max_s);
    Duration::from_secs_f64(capped * jitter.clamp(0.0, 1.0))
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_ingest_request() -> IngestRequest {
        IngestRequest { points: vec![] }
    }

    #[tokio::test]
    async fn post_ingest_success_decodes_body() {
        let server = MockServer::start().await;
        let batch_id = Uuid::now_v7();
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("authorization", "Bearer dev-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "batch_id": batch_id,
                "submitted": 0,
                "accepted": 0,
                "duplicates": 0,
                "quarantined": 0,
                "unknown_metric_keys": [],
                "processing_status": "completed"
            })))
            .mount(&server)
            .await;

        let client = EdgeHttpClient::new(server.uri(), "dev-token", 5);
        let outcome = client.post_ingest(&sample_ingest_request()).await;
        match outcome {
            CallOutcome::Success(resp) => assert_eq!(resp.batch_id, batch_id),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_ingest_422_is_contract_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let client = EdgeHttpClient::new(server.uri(), "dev-token", 5);
        let outcome = client.post_ingest(&sample_ingest_request()).await;
        assert!(matches!(outcome, CallOutcome::ContractRejected));
    }

    #[tokio::test]
    async fn post_ingest_5xx_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = EdgeHttpClient::new(server.uri(), "dev-token", 5);
        let outcome = client.post_ingest(&sample_ingest_request()).await;
        assert!(matches!(outcome, CallOutcome::Transient));
    }

    #[tokio::test]
    async fn device_policy_304_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/device-policy"))
            .and(header("if-none-match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = EdgeHttpClient::new(server.uri(), "dev-token", 5);
        let result = client.get_device_policy(Some("\"abc\"")).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let d0 = backoff_delay(0, 5.0, 300.0, 1.0);
        let d5 = backoff_delay(5, 5.0, 300.0, 1.0);
        let d10 = backoff_delay(10, 5.0, 300.0, 1.0);
        assert_eq!(d0, Duration::from_secs_f64(5.0));
        assert!(d5.as_secs_f64() > d0.as_secs_f64());
        assert_eq!(d10, Duration::from_secs_f64(300.0));
    }

    #[test]
    fn backoff_jitter_is_full_jitter_in_zero_to_one() {
        let d = backoff_delay(3, 5.0, 300.0, 0.0);
        assert_eq!(d, Duration::from_secs_f64(0.0));
    }
}
