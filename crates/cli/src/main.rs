use analysis_catalog::{FileCatalog, ScanOptions, ScanStats, DEFAULT_MAX_FILE_SIZE};
use analysis_session::{Batcher, Session, TaskStatus, DEFAULT_TOKEN_BUDGET};
use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;

mod flags;
mod workspace;

use flags::StrategyFlag;
use workspace::Workspace;

#[derive(Parser)]
#[command(name = "analysis-engine")]
#[command(about = "Session, cache and context engine for incremental codebase analysis", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding session, cache and context state
    #[arg(long, global = true, default_value = ".analysis-engine")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Catalog the analyzable files under a repository root
    Scan {
        path: PathBuf,

        /// Restrict the scan to these extensions (repeatable)
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Exclude structured-config files (yaml/json/xml)
        #[arg(long)]
        no_config: bool,

        #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE)]
        max_file_size: u64,
    },

    /// Scan and partition a repository into token-bounded batches
    Plan {
        path: PathBuf,

        #[arg(long, value_enum, default_value_t)]
        strategy: StrategyFlag,

        /// Token budget per batch
        #[arg(long, default_value_t = DEFAULT_TOKEN_BUDGET)]
        budget: u64,
    },

    #[command(subcommand)]
    Session(SessionCommand),

    #[command(subcommand)]
    Cache(CacheCommand),

    #[command(subcommand)]
    Context(ContextCommand),
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Scan, batch and build the dependency checklist for a new session
    Create {
        path: PathBuf,

        /// What the analysis run is trying to find out
        #[arg(long)]
        goal: String,

        #[arg(long, value_enum, default_value_t)]
        strategy: StrategyFlag,

        #[arg(long, default_value_t = DEFAULT_TOKEN_BUDGET)]
        budget: u64,
    },

    /// Progress summary for a session
    Status { session_id: String },

    /// Checklist items whose dependencies are all complete
    Next {
        session_id: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Record the outcome of one checklist item
    Update {
        session_id: String,
        item_id: String,

        /// pending | in_progress | completed | failed | skipped
        status: String,

        #[arg(long)]
        error: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Entry counts and bytes used per tier
    Stats,

    /// Sweep out expired entries
    Cleanup,

    /// Drop every cached result owned by one file
    ClearFile { path: PathBuf },
}

#[derive(Subcommand)]
enum ContextCommand {
    /// Counts of everything discovered in a session
    Summary { session_id: String },

    /// Context assembled for analyzing one file
    File { session_id: String, path: String },

    /// Add findings (tagged JSON array) discovered in a source file
    Add {
        session_id: String,
        source_file: String,
        findings: String,
    },

    /// Cycle diagnostics over the observed import graph
    Cycles { session_id: String },

    /// Full context snapshot as JSON
    Export { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scan {
            path,
            extensions,
            no_config,
            max_file_size,
        } => {
            let options = ScanOptions {
                extensions: (!extensions.is_empty()).then_some(extensions),
                include_config: !no_config,
                max_file_size,
            };
            let outcome = FileCatalog::new(&path).with_options(options).scan()?;
            let stats = ScanStats::collect(&outcome);
            let hint = stats.processing_hint();
            print_json(&json!({
                "summary": stats,
                "hint": hint,
                "records": outcome.records,
                "skipped": outcome.skipped,
            }))
        }

        Commands::Plan {
            path,
            strategy,
            budget,
        } => {
            let outcome = FileCatalog::new(&path).scan()?;
            let batches =
                Batcher::new(budget).create_batches(&outcome.records, strategy.as_domain());
            print_json(&json!({
                "strategy": strategy.as_domain(),
                "batch_count": batches.len(),
                "batches": batches,
            }))
        }

        Commands::Session(command) => run_session(command, &cli.data_dir).await,
        Commands::Cache(command) => run_cache(command, &cli.data_dir).await,
        Commands::Context(command) => run_context(command, &cli.data_dir).await,
    }
}

async fn run_session(command: SessionCommand, data_dir: &std::path::Path) -> Result<()> {
    let ws = Workspace::open(data_dir).await?;
    match command {
        SessionCommand::Create {
            path,
            goal,
            strategy,
            budget,
        } => {
            let outcome = FileCatalog::new(&path).scan()?;
            let mut session = Session::plan(
                &path,
                goal,
                strategy.as_domain(),
                &outcome.records,
                &Batcher::new(budget),
            );
            let location = ws.sessions.save(&mut session).await?;
            print_json(&json!({
                "session_id": session.id,
                "location": location,
                "batch_count": session.batches.len(),
                "checklist_items": session.checklist.len(),
                "skipped_files": outcome.skipped.len(),
            }))
        }

        SessionCommand::Status { session_id } => {
            let session = ws.sessions.load_latest(&session_id).await?;
            print_json(&json!({
                "session_id": session.id,
                "repo_path": session.repo_path,
                "analysis_goal": session.analysis_goal,
                "strategy": session.strategy,
                "progress": session.progress(),
                "blocked": session.blocked(5),
            }))
        }

        SessionCommand::Next { session_id, limit } => {
            let session = ws.sessions.load_latest(&session_id).await?;
            print_json(&json!({
                "session_id": session.id,
                "ready": session.next_ready(limit),
            }))
        }

        SessionCommand::Update {
            session_id,
            item_id,
            status,
            error,
        } => {
            let mut session = ws.sessions.load_latest(&session_id).await?;
            let status = TaskStatus::from_str(&status)?;
            if !session.update_status(&item_id, status, error) {
                bail!("unknown checklist item: {item_id}");
            }
            ws.sessions.save(&mut session).await?;
            print_json(&json!({
                "session_id": session.id,
                "item_id": item_id,
                "status": status,
                "progress": session.progress(),
            }))
        }
    }
}

async fn run_cache(command: CacheCommand, data_dir: &std::path::Path) -> Result<()> {
    let mut ws = Workspace::open(data_dir).await?;
    match command {
        CacheCommand::Stats => print_json(&json!(ws.cache.stats())),
        CacheCommand::Cleanup => {
            let cleared = ws.cache.clear_expired().await?;
            print_json(&json!({ "cleared": cleared, "stats": ws.cache.stats() }))
        }
        CacheCommand::ClearFile { path } => {
            let cleared = ws.cache.clear_for_file(&path).await?;
            print_json(&json!({ "cleared": cleared }))
        }
    }
}

async fn run_context(command: ContextCommand, data_dir: &std::path::Path) -> Result<()> {
    let mut ws = Workspace::open(data_dir).await?;
    match command {
        ContextCommand::Summary { session_id } => {
            let store = ws.contexts.load(&session_id).await?;
            print_json(&json!(store.summary()))
        }

        ContextCommand::File { session_id, path } => {
            let store = ws.contexts.load(&session_id).await?;
            print_json(&json!(store.context_for_file(&path)))
        }

        ContextCommand::Add {
            session_id,
            source_file,
            findings,
        } => {
            let findings = serde_json::from_str(&findings)
                .context("findings must be a JSON array of tagged objects")?;
            let store = ws.contexts.open(&session_id).await?;
            let added = store.add_findings(findings, &source_file);
            let summary = store.summary();
            ws.contexts.save(&session_id).await?;
            print_json(&json!({ "added": added, "summary": summary }))
        }

        ContextCommand::Cycles { session_id } => {
            let store = ws.contexts.load(&session_id).await?;
            print_json(&json!({ "cycles": store.find_import_cycles() }))
        }

        ContextCommand::Export { session_id } => {
            let store = ws.contexts.load(&session_id).await?;
            print_json(&json!(store.export()))
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}
