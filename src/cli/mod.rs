//! CLI module for the cloudhold tool.
//!
//! This module provides the command-line interface for inspecting and
//! mutating resources and verifying deployments.

mod commands;
mod output;

pub use commands::{
    AccessRule, Cli, Commands, OutputFormat, PollingArgs, ResourceArgs, Toggle, parse_assignment,
};
pub use output::{EntityView, OutputFormatter};
