//! CLI module for the Outpost provisioning tool.
//!
//! This module provides the command-line interface for planning and
//! applying remote actions.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
