//! `xalo-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::{Context, Result};

use xalo_api::config::Config;
use xalo_api::server::Server;
use xalo_core::observability::{init_logging, LogFormat};
use xalo_core::storage::{LocalFsBackend, MemoryBackend, StorageBackend};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(choose_log_format(&config));

    let storage: Arc<dyn StorageBackend> = if let Some(dir) = config.storage.data_dir.as_deref() {
        tracing::info!(data_dir = %dir.display(), "Using local filesystem storage");
        Arc::new(
            LocalFsBackend::new(dir)
                .with_context(|| format!("open data dir {}", dir.display()))?,
        )
    } else {
        if !config.debug {
            anyhow::bail!("XALO_DATA_DIR is required when XALO_DEBUG=false");
        }
        tracing::warn!("XALO_DATA_DIR not set; using in-memory storage backend (debug only)");
        Arc::new(MemoryBackend::new())
    };

    let server = Server::with_storage_backend(config, storage);
    server.serve().await?;
    Ok(())
}
