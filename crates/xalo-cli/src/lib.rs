//! # xalo-cli
//!
//! Terminal admin console for the Xalo site.
//!
//! ## Commands
//!
//! - `xalo list` - List schedules
//! - `xalo create` - Create a schedule from local image files
//! - `xalo edit` - Reorder, remove, and add gallery images, then save
//! - `xalo delete` - Delete a schedule
//! - `xalo upload` - Upload a single image and print its URL
//! - `xalo sweep` - Remove uploads no schedule references
//!
//! New files are uploaded one at a time, in the order given; files that fail
//! to upload are reported and left out of the saved gallery.
//!
//! ## Configuration
//!
//! - `XALO_API_URL` - API endpoint (default: `http://localhost:5000`)
//! - `XALO_API_TOKEN` - Bearer token for admin routes

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod client;
pub mod commands;

use clap::{Parser, Subcommand};

/// Xalo CLI - site administration from the terminal.
#[derive(Debug, Parser)]
#[command(name = "xalo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API server URL.
    #[arg(long, env = "XALO_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// API authentication token.
    #[arg(long, env = "XALO_API_TOKEN")]
    pub api_token: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            api_url: self.api_url.trim_end_matches('/').to_string(),
            api_token: self.api_token.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List schedules, newest month first.
    List,
    /// Create a schedule.
    Create(commands::schedules::CreateArgs),
    /// Edit a schedule's gallery, title, or month.
    Edit(commands::schedules::EditArgs),
    /// Delete a schedule.
    Delete(commands::schedules::DeleteArgs),
    /// Upload one image.
    Upload(commands::uploads::UploadArgs),
    /// Remove uploads no schedule references.
    Sweep(commands::uploads::SweepArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// API server URL, without a trailing slash.
    pub api_url: String,
    /// API authentication token.
    pub api_token: Option<String>,
    /// Output format.
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_flags() {
        let cli = Cli::parse_from([
            "xalo",
            "--api-url",
            "https://api.xalo.edu.vn/",
            "--api-token",
            "token-abc",
            "--format",
            "json",
            "list",
        ]);

        let config = cli.config();
        assert_eq!(config.api_url, "https://api.xalo.edu.vn");
        assert_eq!(config.api_token.as_deref(), Some("token-abc"));
        assert!(matches!(config.format, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::List));
    }
}
