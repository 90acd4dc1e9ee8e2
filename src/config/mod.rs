//! Configuration module for cloudhold.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `cloudhold.yaml` and applying environment overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_API_VERSION, ENV_ENDPOINT, ENV_SUBSCRIPTION_ID,
    find_config_file, user_config_file,
};
pub use spec::{
    CloudholdConfig, ContextSettings, DEFAULT_API_VERSION, DEFAULT_TOKEN_ENV, VerifierSettings,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
