// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! FileWizard API server
//!
//! Standalone HTTP server exposing `/get_files`, `/get_summaries`, `/search_files`,
//! `/update_files` and `/open_file`.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use filewizard::config::AppConfig;
use filewizard::{FileWizard, Result};

#[derive(Parser, Debug)]
#[command(name = "filewizard-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "FileWizard HTTP API server")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("FileWizard API v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(&args.config)?;
    config.apply_env_overrides();

    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }

    info!("Summary cache: {}", config.database.path);
    info!("Text model: {} @ {}", config.text.model, config.text.endpoint);
    info!("Image model: {} @ {}", config.image.model, config.image.endpoint);

    filewizard::web::start_server(FileWizard::from_config(config)?).await
}
