// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! FileWizard: AI file summaries, reorganization proposals and search

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use filewizard::config::AppConfig;
use filewizard::db::SummaryCache;
use filewizard::reconcile::Reconciler;
use filewizard::{FileWizard, Result};

/// FileWizard CLI - AI file organizer with a summary cache
#[derive(Parser, Debug)]
#[command(name = "filewizard")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Summarize, reorganize and search files with an LLM", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Directory to scan
    path: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Only consider these extensions (repeat or separate with ';')
    #[arg(short, long = "ext", value_delimiter = ';')]
    extensions: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Summarize files, reusing cached summaries
    Enrich {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Propose a new directory layout
    Organize {
        #[command(flatten)]
        scan: ScanArgs,

        /// Apply the proposed moves
        #[arg(long)]
        apply: bool,
    },

    /// Find files matching a natural-language query
    Search {
        /// Search query
        query: String,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Move one file and keep its cached summary
    Move {
        /// Root directory the paths are relative to
        root: PathBuf,
        src: String,
        dst: String,
    },

    /// Move journal and undo
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Summary cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent moves
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Undo recent moves
    Undo {
        /// Number of moves to undo
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Drop entries for files that no longer exist
    Prune,

    /// Vacuum database (reclaim space)
    Vacuum,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env_overrides();

    let json = cli.format == "json";

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.web.host = host;
            }
            if let Some(port) = port {
                config.web.port = port;
            }
            filewizard::web::start_server(FileWizard::from_config(config)?).await
        }
        Commands::Enrich { scan } => run_enrich(config, scan, json).await,
        Commands::Organize { scan, apply } => run_organize(config, scan, apply, json).await,
        Commands::Search { query, scan } => run_search(config, scan, &query, json).await,
        Commands::Move { root, src, dst } => {
            let wizard = FileWizard::from_config(config)?;
            if wizard.apply_move(&root, &src, &dst).await? {
                println!("Moved {} -> {}", src, dst);
            } else {
                println!("Nothing to move: {} is not a file", root.join(&src).display());
            }
            Ok(())
        }
        Commands::History { action } => run_history_command(config, action, json).await,
        Commands::Cache { action } => run_cache_command(config, action).await,
        Commands::Config { action } => run_config_command(config, action, &cli.config),
    }
}

async fn run_enrich(config: AppConfig, scan: ScanArgs, json: bool) -> Result<()> {
    let wizard = FileWizard::from_config(config)?;
    let report = wizard.enrich_directory(&scan.path, scan.recursive, &scan.extensions).await?;

    if json {
        return print_json(&report);
    }
    for summary in &report.summaries {
        println!("{}\n    {}", summary.file_path, summary.summary);
    }
    for failure in &report.failed {
        eprintln!("FAILED {}: {}", failure.path, failure.reason);
    }
    println!("\nSummarized {} files ({} failed)", report.summaries.len(), report.failed.len());
    Ok(())
}

async fn run_organize(config: AppConfig, scan: ScanArgs, apply: bool, json: bool) -> Result<()> {
    let wizard = FileWizard::from_config(config)?;
    let proposal = wizard
        .propose_reorganization(&scan.path, scan.recursive, &scan.extensions)
        .await?;

    if json && !apply {
        return print_json(&proposal);
    }

    for item in &proposal.files {
        println!("{} -> {}", item.src_path, item.dst_path);
    }
    for batch in &proposal.failed_batches {
        warn!("No proposal for {} files: {}", batch.paths.len(), batch.reason);
    }

    if apply {
        let report = wizard.apply_moves(&scan.path, &proposal.files).await?;
        for failure in &report.failed {
            eprintln!("FAILED {}: {}", failure.path, failure.reason);
        }
        info!("Applied {} of {} moves", report.moved.len(), proposal.files.len());
        if json {
            return print_json(&report);
        }
    }
    Ok(())
}

async fn run_search(config: AppConfig, scan: ScanArgs, query: &str, json: bool) -> Result<()> {
    let wizard = FileWizard::from_config(config)?;
    let report = wizard.search(&scan.path, scan.recursive, &scan.extensions, query).await?;

    if json {
        return print_json(&report);
    }
    println!("Search results for '{}':", query);
    for hit in &report.files {
        println!("  {}", hit.file);
    }
    if !report.failed_batches.is_empty() {
        eprintln!("{} batches could not be searched", report.failed_batches.len());
    }
    Ok(())
}

async fn run_history_command(config: AppConfig, action: HistoryCommands, json: bool) -> Result<()> {
    match action {
        HistoryCommands::List { count } => {
            let history = filewizard::history::History::new(PathBuf::from(&config.history_path));
            let mut records = history.read_all()?;
            records.reverse();
            records.truncate(count);

            if json {
                return print_json(&records);
            }
            println!("Recent moves ({} entries):", records.len());
            for record in records {
                let status = if record.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} {} -> {} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.root.join(&record.src_path).display(),
                    record.root.join(&record.dst_path).display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            if dry_run {
                let history = filewizard::history::History::new(PathBuf::from(&config.history_path));
                for record in history.get_undoable(count)? {
                    println!("Would undo: {} -> {}", record.dst_path, record.src_path);
                }
                return Ok(());
            }

            let wizard = FileWizard::from_config(config)?;
            let undone = wizard.undo_moves(count).await?;
            if undone.is_empty() {
                println!("No moves to undo");
            }
            for record in undone {
                println!("Undone: {} -> {}", record.dst_path, record.src_path);
            }
        }
    }

    Ok(())
}

async fn run_cache_command(config: AppConfig, action: CacheCommands) -> Result<()> {
    let cache = SummaryCache::open(&config.database.path)?;

    match action {
        CacheCommands::Stats => {
            println!("Summary cache ({}):", config.database.path);
            println!("  Entries: {}", cache.len()?);
        }
        CacheCommands::Prune => {
            let removed = Reconciler::new(cache).prune_vanished().await?;
            println!("Removed {} stale entries", removed.len());
        }
        CacheCommands::Vacuum => {
            cache.vacuum()?;
            println!("Database vacuumed successfully");
        }
    }

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let mut shown = config;
            for engine in [&mut shown.text, &mut shown.image] {
                engine.api_keys = engine.api_keys.iter().map(|_| "***".to_string()).collect();
            }
            print_json(&shown)?;
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Text model: {} @ {}", config.text.model, config.text.endpoint);
            println!("  Image model: {} @ {}", config.image.model, config.image.endpoint);
            println!("  Credentials: {} text, {} image", config.text.api_keys.len(), config.image.api_keys.len());
            println!("  Database: {}", config.database.path);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
