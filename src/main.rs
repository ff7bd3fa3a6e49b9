//! datasync-console command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use datasync_console_lib::application::{ConsistencyEngine, DetectionReport, SelectionSet};
use datasync_console_lib::domain::{FindingKind, RecordStore};
use datasync_console_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use datasync_console_lib::infrastructure::{AppConfig, ConfigManager, SqliteRecordStore, StoreSnapshotLoader};

#[derive(Debug, Parser)]
#[command(name = "datasync-console")]
#[command(about = "Detect and fix consistency issues between orders and customers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run every rule and print the report
    Scan {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply the fixes proposed by one rule
    Fix {
        /// Rule name, e.g. phone-format or missing-time-slot
        #[arg(value_name = "RULE", value_parser = parse_kind)]
        kind: FindingKind,
        /// Confirmation token for fixes that move records between keys
        #[arg(long = "confirm", value_name = "TOKEN")]
        confirmation: Option<String>,
        /// Use the suggested slot for every order missing one
        #[arg(long)]
        use_suggested_slots: bool,
        /// Delivery slot for one order
        #[arg(long = "slot", value_name = "ORDER=SLOT", value_parser = parse_slot)]
        slots: Vec<(String, String)>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Load a JSON export into a collection
    Import { collection: String, file: PathBuf },
    /// Write the default configuration file
    InitConfig,
}

fn parse_kind(value: &str) -> Result<FindingKind, String> {
    FindingKind::parse(value).ok_or_else(|| {
        let names: Vec<&str> = FindingKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown rule '{value}', expected one of: {}", names.join(", "))
    })
}

fn parse_slot(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((order, slot)) if !order.is_empty() && !slot.is_empty() => Ok((order.to_string(), slot.to_string())),
        _ => Err(format!("expected ORDER=SLOT, got '{value}'")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let manager = ConfigManager::new()?;

    if command == Command::InitConfig {
        let config = manager.initialize_on_first_run().await?;
        println!("⚙️ Configuration at {:?}", manager.config_path());
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = manager.load_config()?;
    init_logging_with_config(config.logging.clone(), config.detection.utc_offset_hours)?;
    log_system_info();

    let database_path = config.store.resolve_database_path()?;
    let store = Arc::new(SqliteRecordStore::open(&database_path, config.store.max_connections).await?);

    match command {
        Command::Scan { json } => scan(&config, store, json).await,
        Command::Fix {
            kind,
            confirmation,
            use_suggested_slots,
            slots,
            batch_size,
        } => {
            fix(&config, store, kind, confirmation, use_suggested_slots, slots, batch_size).await
        }
        Command::Import { collection, file } => import(&store, &collection, &file).await,
        Command::InitConfig => Ok(()),
    }
}

fn engine_for(config: &AppConfig, store: Arc<SqliteRecordStore>) -> ConsistencyEngine {
    let store: Arc<dyn RecordStore> = store;
    let source = Arc::new(StoreSnapshotLoader::new(Arc::clone(&store)));
    ConsistencyEngine::with_options(source, store, config.engine_options())
}

async fn scan(config: &AppConfig, store: Arc<SqliteRecordStore>, json: bool) -> Result<()> {
    let report = engine_for(config, store).detect().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &DetectionReport) {
    println!("🔍 Data Consistency Report");
    println!("==========================");
    println!("  📦 Orders: {}", report.total_orders);
    println!("  👤 Customers: {}", report.total_customers);
    println!("  📈 Health score: {}", report.health_score);
    println!(
        "  🧮 Findings: {} ({} missing, {} different, {} informational)",
        report.findings.len(),
        report.counts_by_conflict.missing,
        report.counts_by_conflict.different,
        report.counts_by_conflict.same
    );

    println!("\n📋 By rule:");
    for (kind, count) in &report.counts_by_kind {
        println!("  {:<24} {}", kind.as_str(), count);
    }

    if !report.recommendations.is_empty() {
        println!("\n🛠️  Recommended actions:");
        for (i, recommendation) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, recommendation);
        }
    }
}

async fn fix(
    config: &AppConfig,
    store: Arc<SqliteRecordStore>,
    kind: FindingKind,
    confirmation: Option<String>,
    use_suggested_slots: bool,
    slots: Vec<(String, String)>,
    batch_size: Option<usize>,
) -> Result<()> {
    let engine = engine_for(config, store);
    let report = engine.detect().await?;
    let findings: Vec<_> = report.findings_of(kind).collect();

    let mut selection = SelectionSet::new();
    for (order, slot) in slots {
        selection.assign_time_slot(order, slot);
    }
    if use_suggested_slots {
        let assigned = selection.accept_suggested_time_slots(findings.iter().copied());
        info!("Accepted {} suggested delivery slots", assigned);
    }
    let selected = selection.select_all(findings.iter().copied());
    if selected == 0 {
        println!("✅ Nothing to fix for {} ({} findings, none actionable)", kind, findings.len());
        return Ok(());
    }

    let mut batch_config = engine.default_batch_config();
    if let Some(size) = batch_size {
        batch_config.batch_size = size;
    }
    if let Some(token) = confirmation {
        batch_config = batch_config.with_confirmation(token);
    }
    if selection.requires_confirmation() && batch_config.confirmation_token.is_none() {
        println!("⚠️  These fixes move records between keys; re-run with --confirm RENAME");
    }

    println!("🚀 Applying {} {} fixes", selected, kind);
    let result = engine
        .run_job(selection.into_job(batch_config), |progress| {
            println!(
                "  ⏳ {}/{} processed ({} failed)",
                progress.processed, progress.total, progress.failed
            );
        })
        .await?;

    println!(
        "\n{} {} succeeded, {} failed in {}ms ({:?})",
        if result.failed == 0 { "✅" } else { "⚠️" },
        result.succeeded,
        result.failed,
        result.elapsed_ms,
        result.final_state
    );
    for item in &result.per_item_errors {
        println!("  ❌ {} {}: {}", item.kind, item.subject_key, item.error);
    }
    Ok(())
}

async fn import(store: &SqliteRecordStore, collection: &str, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let records = match serde_json::from_str::<Value>(&content).with_context(|| format!("Invalid JSON in {:?}", file))? {
        Value::Object(records) => records,
        _ => bail!("{:?} must contain an object keyed by record key", file),
    };

    let count = store.import_collection(collection, records).await?;
    println!("📥 Imported {} records into {}", count, collection);
    Ok(())
}
