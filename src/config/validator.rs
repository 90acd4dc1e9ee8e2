//! Configuration validation.
//!
//! Errors block use of the configuration; warnings are reported but
//! non-fatal.

use crate::error::{CloudholdError, ConfigError, Result};
use tracing::debug;

use super::spec::{CloudholdConfig, ContextSettings, VerifierSettings};

/// Total verification budget above which a warning is emitted.
const LONG_BUDGET_SECS: u64 = 15 * 60;

/// Validator for cloudhold configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &CloudholdConfig) -> Result<ValidationResult> {
        let result = self.check(config, |name| std::env::var_os(name).is_some());

        match result.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(result)
            }
            Some(first) => Err(CloudholdError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            ))),
        }
    }

    /// Collects every error and warning; `has_env` reports whether a
    /// variable is set.
    #[must_use]
    pub fn check(
        &self,
        config: &CloudholdConfig,
        has_env: impl Fn(&str) -> bool,
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_context(&config.context, &has_env, &mut result);
        Self::validate_verifier(&config.verifier, &mut result);

        result
    }

    fn validate_context(
        context: &ContextSettings,
        has_env: &impl Fn(&str) -> bool,
        result: &mut ValidationResult,
    ) {
        let endpoint = context.endpoint.trim();
        if endpoint.is_empty() {
            result.push_error("context.endpoint", "Endpoint cannot be empty");
        } else if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            result.push_error(
                "context.endpoint",
                format!("Endpoint '{endpoint}' must be an http(s) URL"),
            );
        } else if endpoint.starts_with("http://") {
            result
                .warnings
                .push(String::from("context.endpoint: plain http sends the token unencrypted"));
        }

        if context.subscription_id.trim().is_empty() {
            result.push_error("context.subscription_id", "Subscription id cannot be empty");
        }

        if context.api_version.trim().is_empty() {
            result.push_error("context.api_version", "API version cannot be empty");
        }

        if !has_env(&context.token_env) {
            result.warnings.push(format!(
                "context.token_env: variable '{}' is not set; requests will be unauthenticated",
                context.token_env
            ));
        }
    }

    fn validate_verifier(verifier: &VerifierSettings, result: &mut ValidationResult) {
        if verifier.max_attempts == 0 {
            result.push_error("verifier.max_attempts", "At least one probe attempt is required");
        }

        if verifier.interval_secs == 0 && verifier.max_attempts > 1 {
            result.push_error(
                "verifier.interval_secs",
                "Interval must be positive when more than one attempt is allowed",
            );
        }

        if verifier.probe_timeout_secs == Some(0) {
            result.push_error("verifier.probe_timeout_secs", "Probe timeout must be positive");
        }

        let budget = verifier.budget_secs();
        if budget > LONG_BUDGET_SECS {
            result.warnings.push(format!(
                "verifier: worst-case wait of {budget}s exceeds {LONG_BUDGET_SECS}s"
            ));
        }
    }
}

impl ValidationResult {
    fn push_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
