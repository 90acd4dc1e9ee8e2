//! Configuration types that map to `cloudhold.yaml`.

use serde::{Deserialize, Serialize};

/// Root of a cloudhold configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudholdConfig {
    /// Control-plane connection.
    pub context: ContextSettings,
    /// Convergence polling defaults.
    #[serde(default)]
    pub verifier: VerifierSettings,
}

/// Where and how to reach the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextSettings {
    /// Base URL of the control plane.
    pub endpoint: String,
    /// Subscription resources are addressed under.
    pub subscription_id: String,
    /// Value of the `api-version` query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

/// Timing of post-action convergence checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifierSettings {
    /// Grace period before the first probe.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Wait between probes.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Probe budget.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Optional per-probe deadline.
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            interval_secs: default_interval(),
            max_attempts: default_max_attempts(),
            probe_timeout_secs: None,
        }
    }
}

impl VerifierSettings {
    /// Worst-case waiting time in seconds, excluding probe time.
    #[must_use]
    pub fn budget_secs(&self) -> u64 {
        self.initial_delay_secs
            .saturating_add(self.interval_secs.saturating_mul(u64::from(self.max_attempts.max(1))))
    }
}

/// Default `api-version`.
pub const DEFAULT_API_VERSION: &str = "2023-01-01";

/// Default token variable.
pub const DEFAULT_TOKEN_ENV: &str = "CLOUDHOLD_TOKEN";

fn default_api_version() -> String {
    String::from(DEFAULT_API_VERSION)
}

fn default_token_env() -> String {
    String::from(DEFAULT_TOKEN_ENV)
}

const fn default_initial_delay() -> u64 {
    crate::convergence::DEFAULT_INITIAL_DELAY_SECS
}

const fn default_interval() -> u64 {
    crate::convergence::DEFAULT_INTERVAL_SECS
}

const fn default_max_attempts() -> u32 {
    crate::convergence::DEFAULT_MAX_ATTEMPTS
}
