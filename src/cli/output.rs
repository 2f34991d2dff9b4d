//! Output formatting for CLI commands.
//!
//! This module renders plans, apply reports, state and validation results
//! either as colored tables or as JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::action::{ActionPlan, ApplyReport, ChangeKind};
use crate::config::ValidationResult;
use crate::fingerprint::FingerprintEngine;
use crate::state::DeploymentState;
use crate::value::TriState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Action")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

/// Recorded action row for table display.
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Action")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an action plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ActionPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &ActionPlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes required - every action is up to date.\n", "✓".green());
        }

        let rows: Vec<PlanRow> = plan
            .changes
            .iter()
            .map(|c| PlanRow {
                change: Self::format_change(c.change),
                name: c.name.clone(),
                kind: c.kind.to_string(),
                target: Self::truncate(&c.target, 40),
                fingerprint: Self::format_fingerprint(&c.fingerprint),
            })
            .collect();

        let mut output = String::from("\nPlan\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to replace, {} deferred, {} unchanged\n",
            plan.count(ChangeKind::Create).to_string().green(),
            plan.count(ChangeKind::Replace).to_string().yellow(),
            plan.count(ChangeKind::Deferred).to_string().cyan(),
            plan.count(ChangeKind::NoOp).to_string().dimmed()
        );
        output
    }

    /// Formats the result of an apply.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if report.success() {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                for outcome in &report.outcomes {
                    let marker = if outcome.success { "✓".green() } else { "✗".red() };
                    let _ = write!(output, "   {marker} {} ({:?})", outcome.name, outcome.operation);
                    if let Some(status) = outcome.state.as_ref().and_then(|s| s.status.as_deref()) {
                        let _ = write!(output, " - {status}");
                    }
                    output.push('\n');
                    if let Some(error) = &outcome.error {
                        for line in error.lines() {
                            let _ = writeln!(output, "       {line}");
                        }
                    }
                }

                let _ = write!(
                    output,
                    "\n   Succeeded: {}\n   Failed: {}\n   Unchanged: {}\n   Not attempted: {}\n",
                    report.succeeded(),
                    report.failed(),
                    report.unchanged,
                    report.not_attempted
                );
                output
            }
        }
    }

    /// Formats recorded state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState (version {})\n", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);

                if state.actions.is_empty() {
                    output.push_str("   No actions recorded.\n");
                } else {
                    let rows: Vec<StateRow> = state
                        .actions
                        .values()
                        .map(|a| StateRow {
                            name: a.name.clone(),
                            kind: a.kind.to_string(),
                            fingerprint: FingerprintEngine::short_hash(&a.fingerprint),
                            status: match (&a.status, a.status_code) {
                                (Some(status), Some(code)) => format!("{status} ({code})"),
                                (Some(status), None) => status.clone(),
                                _ => String::from("-"),
                            },
                            updated: a.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {:?} {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.action
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats validation results.
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
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!("{} Configuration has {} errors\n", "✗".red(), result.error_count())
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }
                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   {} {warning}", "⚠".yellow());
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   {} warnings (use --warnings to show)",
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    /// Formats a one-line message.
    #[must_use]
    pub fn message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let marker = match status {
                    "success" => "✓".green(),
                    "error" => "✗".red(),
                    _ => "⚠".yellow(),
                };
                format!("{marker} {message}")
            }
        }
    }

    fn format_change(change: ChangeKind) -> String {
        match change {
            ChangeKind::Create => "+create".green().to_string(),
            ChangeKind::Replace => "~replace".yellow().to_string(),
            ChangeKind::Deferred => "?deferred".cyan().to_string(),
            ChangeKind::NoOp => "no-op".dimmed().to_string(),
        }
    }

    fn format_fingerprint(fingerprint: &TriState<String>) -> String {
        match fingerprint {
            TriState::Known(digest) => FingerprintEngine::short_hash(digest),
            TriState::Unknown => String::from("(known after apply)"),
            TriState::Null => String::from("-"),
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
}
