//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::cloud::DeploymentReport;
use crate::config::ValidationResult;
use crate::convergence::Convergence;
use crate::resource::{Definition, RemoteClient, RemoteResource, ResourceEntity, ResourceStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Point-in-time view of one cached resource.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    /// Resource name.
    pub name: String,
    /// Resource group.
    pub resource_group: String,
    /// Identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// Time of the last successful load.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Writable attributes of the last snapshot.
    pub properties: Definition,
}

impl EntityView {
    /// Captures the current state of `entity`.
    pub async fn capture<C: RemoteClient>(entity: &ResourceEntity<C>) -> Self {
        Self {
            name: entity.name().to_string(),
            resource_group: entity.resource_group().to_string(),
            id: entity.id().await,
            status: entity.status().await,
            loaded_at: entity.loaded_at().await,
            properties: entity
                .snapshot()
                .await
                .map(|remote| remote.definition())
                .unwrap_or_default(),
        }
    }
}

/// Resource row for table display.
#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Resource group")]
    resource_group: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Loaded")]
    loaded_at: String,
}

/// Attribute row for table display.
#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a resource listing.
    #[must_use]
    pub fn format_entities(&self, kind: &str, entities: &[EntityView]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(entities).unwrap_or_default(),
            OutputFormat::Text => Self::format_entities_text(kind, entities),
        }
    }

    fn format_entities_text(kind: &str, entities: &[EntityView]) -> String {
        if entities.is_empty() {
            return format!("   No {kind} found.\n");
        }

        let rows: Vec<EntityRow> = entities
            .iter()
            .map(|e| EntityRow {
                name: e.name.clone(),
                resource_group: e.resource_group.clone(),
                status: Self::format_status(e.status),
                loaded_at: e
                    .loaded_at
                    .map_or_else(|| String::from("-"), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            })
            .collect();

        let mut output = Table::new(rows).to_string();
        let _ = write!(output, "\n\n{} {kind}\n", entities.len());
        output
    }

    /// Formats a single resource with its attributes.
    #[must_use]
    pub fn format_entity(&self, entity: &EntityView) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(entity).unwrap_or_default(),
            OutputFormat::Text => Self::format_entity_text(entity),
        }
    }

    fn format_entity_text(entity: &EntityView) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "\n{} ({})", entity.name.bold(), Self::format_status(entity.status));
        let _ = writeln!(output, "   Id: {}", entity.id);
        let _ = writeln!(output, "   Resource group: {}\n", entity.resource_group);

        if entity.properties.is_empty() {
            output.push_str("   No properties.\n");
            return output;
        }

        let rows: Vec<PropertyRow> = entity
            .properties
            .iter()
            .map(|(key, value)| PropertyRow {
                key: key.clone(),
                value: Self::truncate(&value.to_string(), 60),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid", "✓".green());
                }
                for error in &result.errors {
                    let _ = writeln!(output, "{} {error}", "✗".red());
                }
                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "{} {warning}", "⚠".yellow());
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "{} warning(s); rerun with --warnings to show them",
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    /// Formats a successful convergence check.
    #[must_use]
    pub fn format_convergence(&self, convergence: &Convergence) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(convergence).unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} {} is healthy after {} probe(s) ({:.1}s)\n",
                "✓".green(),
                convergence.target,
                convergence.attempts,
                convergence.elapsed.as_secs_f64()
            ),
        }
    }

    /// Formats a deployment report.
    #[must_use]
    pub fn format_deployment(&self, report: &DeploymentReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Deployed to {} at {}\n",
                    "✓".green(),
                    report.target,
                    report.deployed_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                match &report.convergence {
                    Some(convergence) => output.push_str(&self.format_convergence(convergence)),
                    None => output.push_str("   Health was not checked.\n"),
                }
                output
            }
        }
    }

    /// Formats a status with a color matching its severity.
    fn format_status(status: ResourceStatus) -> String {
        match status {
            ResourceStatus::Ok => status.to_string().green().to_string(),
            ResourceStatus::Error => status.to_string().red().to_string(),
            ResourceStatus::NotExist => status.to_string().dimmed().to_string(),
            s if s.is_transient() => s.to_string().yellow().to_string(),
            s => s.to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, marker: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{marker} {message}"),
        }
    }
}
