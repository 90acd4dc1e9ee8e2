//! HTTP status probe.
//!
//! Polls a status URL, such as a host-status admin endpoint, and classifies
//! the reply into a [`ProbeOutcome`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::convergence::{Probe, ProbeOutcome};
use crate::error::{CloudholdError, Result};

/// Default probe request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// JSON field holding a reported state.
const STATE_FIELD: &str = "state";

/// Reported state meaning the target has failed.
const ERROR_STATE: &str = "Error";

/// Probe that GETs a URL.
///
/// A 2xx reply is healthy. With an expected state, the JSON body's `state`
/// field must also match it (case-insensitive), and a reported `Error` state
/// is a hard failure. 401 and 403 are hard failures since waiting will not
/// fix credentials. Anything else, including connection errors, means "not
/// yet".
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    token: Option<String>,
    expect_state: Option<String>,
}

impl HttpProbe {
    /// Creates a probe for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudholdError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            token: None,
            expect_state: None,
        })
    }

    /// Requires the reported `state` to equal `state`.
    #[must_use]
    pub fn expect_state(mut self, state: impl Into<String>) -> Self {
        self.expect_state = Some(state.into());
        self
    }

    /// Sends a bearer token with each request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Probed URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_body(&self, body: &str) -> ProbeOutcome {
        let Some(expected) = &self.expect_state else {
            return ProbeOutcome::Healthy;
        };

        let state = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get(STATE_FIELD).and_then(Value::as_str).map(ToString::to_string));

        match state {
            Some(state) if state.eq_ignore_ascii_case(expected) => ProbeOutcome::Healthy,
            Some(state) if state.eq_ignore_ascii_case(ERROR_STATE) => {
                ProbeOutcome::HardFailure(format!("{} reported state {state}", self.url))
            }
            Some(state) => {
                debug!("{} reports state {state}, waiting for {expected}", self.url);
                ProbeOutcome::NotYetHealthy
            }
            None => {
                debug!("{} returned no {STATE_FIELD} field", self.url);
                ProbeOutcome::NotYetHealthy
            }
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> Result<ProbeOutcome> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Probe of {} failed to connect: {e}", self.url);
                return Ok(ProbeOutcome::NotYetHealthy);
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(ProbeOutcome::HardFailure(format!("{} returned {status}", self.url)));
        }
        if !status.is_success() {
            debug!("Probe of {} returned {status}", self.url);
            return Ok(ProbeOutcome::NotYetHealthy);
        }

        let body = response.text().await.unwrap_or_default();
        Ok(self.classify_body(&body))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(status: u16, body: Option<Value>) -> MockServer {
        let server = MockServer::start().await;
        let mut template = ResponseTemplate::new(status);
        if let Some(body) = body {
            template = template.set_body_json(body);
        }
        Mock::given(method("GET"))
            .and(path("/admin/host/status"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn probe_for(server: &MockServer) -> HttpProbe {
        HttpProbe::new(format!("{}/admin/host/status", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_success_without_expectation() {
        let server = serve(200, None).await;
        assert_eq!(probe_for(&server).probe().await.unwrap(), ProbeOutcome::Healthy);
    }

    #[tokio::test]
    async fn test_expected_state() {
        let server = serve(200, Some(json!({ "state": "Running" }))).await;
        let outcome = probe_for(&server).expect_state("running").probe().await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Healthy);
    }

    #[tokio::test]
    async fn test_other_state_is_not_yet() {
        let server = serve(200, Some(json!({ "state": "Initialized" }))).await;
        let outcome = probe_for(&server).expect_state("Running").probe().await.unwrap();
        assert_eq!(outcome, ProbeOutcome::NotYetHealthy);
    }

    #[tokio::test]
    async fn test_error_state_is_hard_failure() {
        let server = serve(200, Some(json!({ "state": "Error" }))).await;
        let outcome = probe_for(&server).expect_state("Running").probe().await.unwrap();
        assert!(matches!(outcome, ProbeOutcome::HardFailure(_)));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = serve(503, None).await;
        assert_eq!(probe_for(&server).probe().await.unwrap(), ProbeOutcome::NotYetHealthy);

        let server = serve(401, None).await;
        assert!(matches!(
            probe_for(&server).probe().await.unwrap(),
            ProbeOutcome::HardFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_not_yet() {
        let server = MockServer::start().await;
        let url = format!("{}/admin/host/status", server.uri());
        drop(server);

        let outcome = HttpProbe::new(url).unwrap().probe().await.unwrap();
        assert_eq!(outcome, ProbeOutcome::NotYetHealthy);
    }
}
