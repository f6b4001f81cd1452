mod config;
mod report;

use std::path::PathBuf;
use std::time::Duration;

use actionlog_ai::escalation::{DEFAULT_API_URL, DEFAULT_MODEL};
use actionlog_ai::{AnthropicJudge, DuplicateDetector, Escalator};
use actionlog_sync::http::DEFAULT_BASE_URL;
use actionlog_sync::{CleanupPlan, ColumnMap, SheetClient, SheetStore};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::FileConfig;

/// Find and clean up duplicate items in an action-item log.
#[derive(Debug, Parser)]
#[command(name = "actionlog", version)]
struct Cli {
    /// JSON file with `thresholds`, `vocabulary` and `detector` sections.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never call the LLM judge; ambiguous pairs are left for review.
    #[arg(long, global = true)]
    no_llm: bool,

    #[command(flatten)]
    sheet: SheetArgs,

    #[command(flatten)]
    judge: JudgeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SheetArgs {
    #[arg(long, env = "SHEET_API_TOKEN", hide_env_values = true)]
    sheet_token: String,

    #[arg(long, env = "SHEET_API_URL", default_value = DEFAULT_BASE_URL)]
    sheet_url: String,

    #[arg(long, env = "SHEET_ID")]
    sheet_id: u64,

    /// Column id of the action item text.
    #[arg(long, env = "COL_ACTION")]
    col_action: u64,

    #[arg(long, env = "COL_STATUS")]
    col_status: u64,

    #[arg(long, env = "COL_DATE_LOGGED")]
    col_date_logged: u64,

    #[arg(long, env = "COL_NOTES")]
    col_notes: u64,

    /// Needed by `merge`.
    #[arg(long, env = "COL_OCCURRENCE_COUNT")]
    col_occurrence_count: Option<u64>,
}

impl SheetArgs {
    fn client(&self) -> SheetClient {
        let columns = ColumnMap {
            action: self.col_action,
            status: self.col_status,
            date_logged: self.col_date_logged,
            notes: self.col_notes,
            occurrence_count: self.col_occurrence_count,
        };
        SheetClient::new(
            self.sheet_url.clone(),
            self.sheet_token.clone(),
            self.sheet_id,
            columns,
        )
    }
}

#[derive(Debug, Args)]
struct JudgeArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "ANTHROPIC_API_URL", default_value = DEFAULT_API_URL)]
    anthropic_url: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report duplicates without changing the sheet.
    Scan {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Set each duplicate's status to `Duplicate` with a note naming its original.
    Mark,
    /// Add duplicates to their originals' occurrence counts, then delete them.
    Merge {
        /// Apply the plan. Without this flag the plan is only printed.
        #[arg(long)]
        confirm: bool,
    },
    /// Check an item against the log before adding it.
    Check {
        #[arg(long)]
        text: String,
    },
    /// Entry counts per status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("actionlog v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = FileConfig::load(cli.config.as_deref())?;
    let rules = config.rules().context("invalid configuration")?;

    let mut detector = DuplicateDetector::new(rules).with_config(config.detector.clone());
    match (&cli.judge.anthropic_key, cli.no_llm) {
        (Some(key), false) => {
            let judge = AnthropicJudge::new(
                cli.judge.anthropic_url.clone(),
                key.clone(),
                cli.judge.model.clone(),
            );
            let timeout = Duration::from_secs(config.detector.escalation_timeout_secs);
            let escalator = Escalator::new(Box::new(judge)).with_timeout(timeout);
            detector = detector.with_escalator(escalator);
        }
        (None, false) => {
            tracing::warn!("ANTHROPIC_API_KEY not set; ambiguous pairs will be left for review");
        }
        (_, true) => {}
    }

    let store = cli.sheet.client();

    match cli.command {
        Command::Scan { json } => {
            let entries = fetch(&store).await?;
            let scan = detector.find_duplicates(&entries).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&scan)?);
            } else {
                report::print_header("DUPLICATE SCAN");
                report::print_scan(&scan);
            }
        }
        Command::Mark => {
            let entries = fetch(&store).await?;
            let scan = detector.find_duplicates(&entries).await;
            report::print_header("MARK DUPLICATES");
            report::print_scan(&scan);

            let plan = CleanupPlan::mark(&scan);
            if plan.is_empty() {
                return Ok(());
            }
            report::print_plan(&plan);
            let outcome = plan.apply(&store).await.context("marking duplicates")?;
            report::print_outcome(&outcome);
        }
        Command::Merge { confirm } => {
            let entries = fetch(&store).await?;
            let scan = detector.find_duplicates(&entries).await;
            report::print_header("MERGE DUPLICATES");
            report::print_scan(&scan);

            let plan = CleanupPlan::merge(&scan, chrono::Local::now().naive_local());
            if plan.is_empty() {
                return Ok(());
            }
            report::print_plan(&plan);
            if !confirm {
                println!("\nDry run. Re-run with --confirm to apply.");
                return Ok(());
            }
            let outcome = plan.apply(&store).await.context("merging duplicates")?;
            report::print_outcome(&outcome);
        }
        Command::Check { text } => {
            let entries = fetch(&store).await?;
            let check = detector.check_new_item(&text, &entries).await;
            report::print_check(&text, &check);
        }
        Command::Status => {
            let entries = fetch(&store).await?;
            report::print_status(&entries);
        }
    }

    Ok(())
}

async fn fetch(store: &dyn SheetStore) -> anyhow::Result<Vec<actionlog_core::LogEntry>> {
    eprintln!("Fetching sheet...");
    let entries = store.fetch_entries().await.context("fetching sheet")?;
    eprintln!("  {} entries with action text", entries.len());
    Ok(entries)
}
