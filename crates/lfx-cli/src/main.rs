//! 🚀 lfx-cli: the front door, the bouncer, the maitre d' of lfx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: parse args, set up logging, load config, wire ctrl-c to a
//! cancellation token, then let the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use lfx::app_config::{AppConfig, load_config};
use lfx::migration::{MigrationProgress, MigrationReport};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lfx", version, about = "Ferry security events: poll to a broker, or migrate legacy indices into daily ones")]
struct Cli {
    /// TOML config file. Env vars (LFX_*, nested with __) are always read too.
    #[arg(short, long, env = "LFX_CONFIG", default_value = "lfx.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the search API on a cadence and publish new events to the broker, until ctrl-c
    Ingest,
    /// Scroll every configured legacy index into daily indices, then exit
    Migrate,
}

/// 🚀 main(): where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> ExitCode {
    // 📡 Set up tracing: because println! debugging is a lifestyle choice we're moving past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            // 🗑️ Exit with prejudice. Process exitus maximus.
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let app_config = load(&cli.config)?;
    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());

    match cli.command {
        Command::Ingest => {
            let stats = lfx::run_ingest(app_config, shutdown).await?;
            info!(
                cycles = stats.cycles,
                events_published = stats.events_published,
                fetch_failures = stats.fetch_failures,
                publish_failures = stats.publish_failures,
                "👋 ingestion stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate => {
            let report = lfx::run_migration(app_config, shutdown).await?;
            println!("{}", render_report(&report));
            if report.has_aborted() {
                error!("💀 at least one index could not be scrolled to the end, see the log above");
                return Ok(ExitCode::FAILURE);
            }
            if report.total_failed_pages() > 0 {
                warn!(
                    failed_pages = report.total_failed_pages(),
                    "⚠️ some bulk pages failed, those documents were NOT written. Re-running is safe."
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 🔧 The config file is optional. If it's not there, env vars carry the whole show.
fn load(path: &Path) -> Result<AppConfig> {
    let exists = path.try_exists().with_context(|| {
        format!(
            "💀 Couldn't even check whether the config file exists. Permissions, maybe? Was checking here: '{}'",
            path.display()
        )
    })?;
    if !exists {
        info!(path = %path.display(), "📭 no config file, reading LFX_* env vars only");
    }
    load_config(exists.then_some(path))
        .context("💀 Couldn't load the config. Take a look at the file and the LFX_* env vars, make sure you didn't forget something obvious.")
}

/// 🛑 First ctrl-c asks nicely: the token is cancelled, the current cycle/page finishes.
fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 ctrl-c received, finishing the current cycle/page and stopping");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "💀 could not listen for ctrl-c"),
        }
    });
}

/// 🍽️ One row per index, comfy as always.
fn render_report(report: &MigrationReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["index", "outcome", "total hits", "processed", "written", "skipped", "pages", "failed pages"]);
    for entry in &report.indices {
        let progress = entry.outcome.progress().copied().unwrap_or_default();
        table.add_row(report_row(&entry.index, entry.outcome.label(), &progress));
    }
    if report.indices.len() > 1 {
        table.add_row(report_row("all indices", "", &report.totals()));
    }
    table
}

fn report_row(index: &str, outcome: &str, progress: &MigrationProgress) -> Vec<Cell> {
    let number = |n: u64| Cell::new(n).set_alignment(CellAlignment::Right);
    vec![
        Cell::new(index),
        Cell::new(outcome),
        number(progress.total_hits),
        number(progress.processed),
        number(progress.written),
        number(progress.skipped),
        number(progress.pages),
        number(progress.failed_pages),
    ]
}

/// 🧅 Peel the onion of sadness, one layer at a time, and sniff for connection problems.
fn report_error(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("onnection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
            || cause_str.contains("BrokerTransportFailure")
            || cause_str.contains("metadata probe failed")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like a service isn't reachable. Double-check that the search API, \
            the cluster, or the broker is actually running and that the URLs in the config are right. \
            If you're using Docker, `docker ps` to see what's up. Even servers need a nudge sometimes. ☕"
        );
    }
}
