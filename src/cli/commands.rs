//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// Cloudhold - cache-consistent control of hierarchical cloud resources.
#[derive(Parser, Debug)]
#[command(name = "cloudhold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CLOUDHOLD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List every resource of a kind under a scope.
    List {
        /// Provider namespace, e.g. `Microsoft.DBforPostgreSQL`.
        namespace: String,

        /// Resource kind, e.g. `servers` or `firewallRules`.
        kind: String,

        /// Identifier of the owning resource (omit for top-level kinds).
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show one resource.
    Show(ResourceArgs),

    /// Create or update a resource.
    Apply {
        /// Target resource.
        #[command(flatten)]
        target: ResourceArgs,

        /// Attribute assignment `key=value`; values are parsed as JSON when
        /// possible.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, Value)>,

        /// Fail if the resource already exists instead of updating it.
        #[arg(long)]
        create_only: bool,
    },

    /// Delete a resource.
    Delete(ResourceArgs),

    /// Restart a resource.
    Restart(ResourceArgs),

    /// Poll a status URL until it reports healthy.
    Verify {
        /// Status URL to probe.
        url: String,

        /// Verifier timing overrides.
        #[command(flatten)]
        polling: PollingArgs,
    },

    /// Upload an artifact and verify the target comes up healthy.
    Deploy {
        /// Zip package to upload.
        artifact: PathBuf,

        /// Deployment endpoint URL.
        #[arg(long)]
        target: String,

        /// Status URL checked after the upload.
        #[arg(long)]
        health: Option<String>,

        /// Verifier timing overrides.
        #[command(flatten)]
        polling: PollingArgs,
    },

    /// Toggle firewall access to a database server.
    Access {
        /// Identifier of the server owning the firewall rules.
        server: String,

        /// Which rule to toggle.
        #[arg(value_enum)]
        rule: AccessRule,

        /// Desired state.
        #[arg(value_enum)]
        state: Toggle,

        /// This machine's public IP (required to enable local access).
        #[arg(long)]
        ip: Option<String>,
    },
}

/// Identifies one resource.
#[derive(Args, Debug, Clone)]
pub struct ResourceArgs {
    /// Provider namespace, e.g. `Microsoft.DBforPostgreSQL`.
    pub namespace: String,

    /// Resource kind.
    pub kind: String,

    /// Resource name.
    pub name: String,

    /// Resource group (defaults to the parent's).
    #[arg(short = 'g', long, default_value = "")]
    pub resource_group: String,

    /// Identifier of the owning resource (omit for top-level kinds).
    #[arg(long)]
    pub parent: Option<String>,
}

/// Overrides of the configured verifier timing.
#[derive(Args, Debug, Clone, Default)]
pub struct PollingArgs {
    /// Require the JSON `state` field to equal this value.
    #[arg(long)]
    pub expect_state: Option<String>,

    /// Seconds to wait before the first probe.
    #[arg(long)]
    pub initial_delay: Option<u64>,

    /// Seconds between probes.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Maximum number of probes.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

/// Firewall rules managed by `access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AccessRule {
    /// Access from the provider's own services.
    Service,
    /// Access from this machine.
    Local,
}

/// On/off switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Toggle {
    /// Enable.
    On,
    /// Disable.
    Off,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses `key=value`, reading the value as JSON and falling back to a string.
///
/// # Errors
///
/// Returns a message if there is no `=` or the key is empty.
pub fn parse_assignment(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
