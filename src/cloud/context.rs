//! Connection details shared by every client of one control plane.

use std::fmt;

use crate::config::{CloudholdConfig, ConfigParser};
use crate::error::Result;

/// Control-plane endpoint, subscription and credentials.
///
/// Passed explicitly to each client; there is no process-wide session.
#[derive(Clone)]
pub struct CloudContext {
    endpoint: String,
    subscription_id: String,
    api_version: String,
    token: Option<String>,
}

impl CloudContext {
    /// Creates an unauthenticated context.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        subscription_id: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            subscription_id: subscription_id.into(),
            api_version: api_version.into(),
            token: None,
        }
    }

    /// Attaches a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds a context from configuration, reading the token from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvVar` if the token variable is unset.
    pub fn from_config(config: &CloudholdConfig) -> Result<Self> {
        let token = ConfigParser::token(config)?;
        Ok(Self::new(
            &config.context.endpoint,
            &config.context.subscription_id,
            &config.context.api_version,
        )
        .with_token(token))
    }

    /// Base URL, without a trailing slash.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Subscription identifier.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// `api-version` query value.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Absolute URL for a resource path such as `/subscriptions/...`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

impl fmt::Debug for CloudContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudContext")
            .field("endpoint", &self.endpoint)
            .field("subscription_id", &self.subscription_id)
            .field("api_version", &self.api_version)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
