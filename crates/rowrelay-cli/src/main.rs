//! 🚀 rowrelay: the front door, the bouncer, the maitre d' of the relay.
//!
//! 🎬 *[narrator voice]* "It all started with a folder full of CSVs..."
//! 📦 This binary is the thin wrapper that parses args, loads config, sets up
//! logging, and then lets the library do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use rowrelay::FileOutcome;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚚 Relay CSV exports to the event API, one batch at a time.
///
/// The file name decides the event kind: `identify_*`, `track_*`, `page_*`,
/// `screen_*`, `group_*`, `alias_*`, or `object_<collection>_*`.
#[derive(Debug, Parser)]
#[command(name = "rowrelay", version, about)]
struct Cli {
    /// Optional TOML config file. Env vars (ROWRELAY_*) fill in the rest.
    #[arg(short, long, env = "ROWRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Record batches in memory instead of sending them. No write key needed.
    #[arg(long)]
    dry_run: bool,

    /// CSV files to relay. They run concurrently.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Relay every file (send it and pray 🙏)
/// 5. Print the scoreboard, exit 1 if anyone lost
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let app_config = rowrelay::app_config::load_config(cli.config.as_deref())
        .context("💀 Couldn't load the configuration. Check the file, check the env, check for a tab where a space should be.")?;

    let outcomes = match rowrelay::run(&app_config, &cli.files, cli.dry_run).await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            report_error(&err);
            std::process::exit(1);
        }
    };

    println!("{}", summary_table(&outcomes));

    let mut any_failed = false;
    for outcome in outcomes {
        let failure = match outcome.result {
            Ok(report) => report.into_result().err().map(anyhow::Error::from),
            Err(err) => Some(err),
        };
        if let Some(err) = failure {
            any_failed = true;
            report_error(&err.context(format!("💀 '{}' did not make it", outcome.path.display())));
        }
    }

    if any_failed {
        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }
    Ok(())
}

/// 🧅 Peel the onion of sadness one layer at a time, and say so if it smells like the network.
fn report_error(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like the event API isn't reachable. \
            Double-check `host` / `objects_host` (or ROWRELAY_HOST), your network, \
            and any proxy in the way. Even servers need a nudge sometimes. ☕"
        );
    }
}

/// 🍽️ File, kind, rows, batches, failures, status. Comfy.
fn summary_table(outcomes: &[FileOutcome]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["file", "kind", "rows", "batches", "failures", "status"]);
    for outcome in outcomes {
        let file = outcome.path.display().to_string();
        match &outcome.result {
            Ok(report) => {
                let failed_batches = report.batches.len() - report.batches_delivered();
                let failures = report.row_failures.len() + failed_batches;
                table.add_row(vec![
                    file,
                    report.kind.to_string(),
                    format!("{}/{}", report.rows_enqueued, report.rows_read),
                    format!("{}/{}", report.batches_delivered(), report.batches.len()),
                    failures.to_string(),
                    if report.is_success() { "✅ ok" } else { "💀 failed" }.to_string(),
                ]);
            }
            Err(_) => {
                table.add_row(vec![
                    file,
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "💀 failed".to_string(),
                ]);
            }
        }
    }
    table
}
