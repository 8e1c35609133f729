//! Upload commands - single upload and orphan sweep.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use xalo_core::ImageUploader;

use crate::client::{ApiClient, HttpUploader, SweepBody};
use crate::commands::schedules::read_files;
use crate::{Config, OutputFormat};

/// Arguments for the upload command.
#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Image file to upload.
    pub file: PathBuf,
}

/// Arguments for the sweep command.
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Report what would be removed without deleting.
    #[arg(long)]
    pub dry_run: bool,

    /// Keep unreferenced uploads younger than this many seconds.
    #[arg(long)]
    pub grace_secs: Option<u64>,
}

/// Execute the upload command.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the upload is refused.
pub async fn upload(args: UploadArgs, config: &Config) -> Result<()> {
    let client = ApiClient::new(config)?;
    let file = read_files(std::slice::from_ref(&args.file))
        .await?
        .into_iter()
        .next()
        .context("No file to upload")?;
    let url = HttpUploader::new(client).upload(&file).await?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "image_url": url }))?
            );
        }
        OutputFormat::Text | OutputFormat::Table => println!("{url}"),
    }
    Ok(())
}

/// Execute the sweep command.
///
/// # Errors
///
/// Returns an error if the API request fails.
pub async fn sweep(args: &SweepArgs, config: &Config) -> Result<()> {
    let client = ApiClient::new(config)?;
    let report = client
        .sweep(&SweepBody {
            dry_run: args.dry_run,
            grace_seconds: args.grace_secs,
        })
        .await?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            let verb = if report.dry_run { "Would remove" } else { "Removed" };
            println!(
                "Scanned {} uploads, {} referenced. {verb} {}:",
                report.scanned,
                report.referenced,
                report.removed.len().bold()
            );
            for url in &report.removed {
                println!("  {}", url.dimmed());
            }
        }
    }
    Ok(())
}
