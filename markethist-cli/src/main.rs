//! Markethist CLI — fetch the configured item catalog once and write daily series.
//!
//! Exit status: 0 when every item was written, 1 when any item failed or was
//! skipped, 2 when the run could not start (bad config, unusable output dir).

use anyhow::{Context, Result};
use clap::Parser;
use markethist_core::data::transport::{ReqwestClient, SessionCredentials};
use markethist_core::data::ItemIdentity;
use markethist_runner::{BatchSummary, FetchOrchestrator, ItemResult, RunConfig, TracingProgress};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "markethist",
    version,
    about = "Markethist — marketplace price history to daily CSV series"
)]
struct Cli {
    /// Path to a TOML config file. Built-in defaults are used without one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Override the number of concurrent workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Override the global request rate.
    #[arg(long)]
    requests_per_minute: Option<u32>,

    /// Print target files and candidate URLs, then exit without fetching.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Session cookie `steamLoginSecure`. Hidden: pass it through the
    /// environment so the value stays out of the process list.
    #[arg(long, env = "STEAM_LOGIN_SECURE", hide = true, hide_env_values = true)]
    login_secure: Option<String>,

    /// Session cookie `sessionid`.
    #[arg(long, env = "sessionid", hide = true, hide_env_values = true)]
    session_id: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn load_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.run.output_dir = dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.run.workers = workers;
    }
    if let Some(rpm) = cli.requests_per_minute {
        config.transport.requests_per_minute = rpm;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let items = config.items();
    let credentials = SessionCredentials::new(cli.login_secure, cli.session_id);

    let client = ReqwestClient::new(config.transport.timeout()).context("build HTTP client")?;
    let orchestrator = FetchOrchestrator::from_config(&config, Box::new(client), credentials.clone());

    if cli.dry_run {
        print_plan(&orchestrator, &items);
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        items = items.len(),
        authenticated = credentials.is_authenticated(),
        "loaded catalog"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        warn!("shutdown requested; finishing in-flight items (press Ctrl-C again to abort)");
    })
    .context("install Ctrl-C handler")?;

    let summary = orchestrator.run(&items, &cancel, &TracingProgress)?;
    print_summary(&summary);

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn print_plan(orchestrator: &FetchOrchestrator, items: &[ItemIdentity]) {
    let plan = orchestrator.plan(items);
    println!(
        "{} items, {} worker(s), output {}",
        plan.len(),
        orchestrator.workers(),
        orchestrator.writer().output_dir().display()
    );
    for entry in &plan {
        println!();
        println!("{}", entry.item);
        println!("  -> {}", entry.path.display());
        for candidate in &entry.candidates {
            println!("  [{}] {}", candidate.kind, candidate.url);
        }
    }
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("=== Batch Summary ===");
    println!("Items:      {}", summary.total);
    println!("Written:    {}", summary.succeeded);
    println!("Failed:     {}", summary.failed);
    if summary.skipped > 0 {
        println!("Skipped:    {}", summary.skipped);
    }
    for outcome in summary.failures() {
        if let ItemResult::Failed { stage, error } = &outcome.result {
            eprintln!("Error for {} ({stage}): {error}", outcome.item);
        }
    }
}
