use anyhow::Context;
use clap::{Parser, Subcommand};
use event_ingest::adapters::registry::AdapterRegistry;
use event_ingest::config::Config;
use event_ingest::geocode::{NominatimGeocoder, RateLimitedGeocoder};
use event_ingest::monitoring::AdapterHealthMonitor;
use event_ingest::pipeline::dates::normalize_date;
use event_ingest::pipeline::{ImportOptions, ImportOrchestrator, ImportReport};
use event_ingest::storage::{EventStore, SqliteEventStore};
use event_ingest::{logging, metrics, City};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "event_ingest")]
#[command(about = "Multi-city event ingestion pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the stored events of one city, or of every supported city
    Import {
        /// City to import (name or alias, e.g. "nyc")
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        city: Option<String>,
        /// Import every supported city
        #[arg(long)]
        all: bool,
    },
    /// List supported cities and their accepted aliases
    Cities,
    /// Show how a free-text date normalizes
    NormalizeDate {
        text: String,
    },
    /// Print the stored events of a city as JSON
    Show {
        #[arg(long)]
        city: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Import { city, all } => {
            let config = Config::load().context("loading configuration")?;
            let cities = match city {
                Some(name) if !all => vec![name.parse::<City>()?],
                _ => City::ALL.to_vec(),
            };
            import(&config, &cities).await
        }
        Commands::Cities => {
            for city in City::ALL {
                println!("{}: {}", city, city.aliases().join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::NormalizeDate { text } => {
            match normalize_date(&text) {
                Some(date) => println!("{}", date),
                None => println!("null"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { city } => {
            let city: City = city.parse()?;
            let config = Config::load().context("loading configuration")?;
            let store = SqliteEventStore::open(&config.store.sqlite_path)?;
            let events = store.events_for_city(city).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn import(config: &Config, cities: &[City]) -> anyhow::Result<ExitCode> {
    let store = Arc::new(SqliteEventStore::open(&config.store.sqlite_path)?);
    let client = reqwest::Client::builder()
        .timeout(config.import.adapter_timeout())
        .build()?;
    let registry = AdapterRegistry::load_from_directory(&config.sources.registry_dir, client)
        .context("loading source registry")?;
    let monitor = Arc::new(AdapterHealthMonitor::new(config.monitoring.settings()));

    let mut orchestrator = ImportOrchestrator::new(registry, store)
        .with_options(ImportOptions::from(&config.import))
        .with_monitor(Arc::clone(&monitor));
    if config.geocoder.enabled {
        let geocode_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.geocoder.timeout_secs))
            .build()?;
        let geocoder = NominatimGeocoder::new(
            geocode_client,
            config.geocoder.base_url.clone(),
            config.geocoder.user_agent.clone(),
        );
        orchestrator = orchestrator.with_geocoder(Arc::new(RateLimitedGeocoder::new(
            Arc::new(geocoder),
            Duration::from_millis(config.geocoder.min_delay_ms),
            config.geocoder.cache_capacity,
        )));
        info!("📍 Geocoding backfill enabled via {}", config.geocoder.base_url);
    }

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received; stopping after the current adapter");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut commit_failed = false;
    for &city in cities {
        if orchestrator.is_cancelled() {
            break;
        }
        match orchestrator.import_city(city).await {
            Ok(report) => print_report(&report),
            Err(e) => {
                commit_failed = true;
                println!("\n❌ {}: {}", city, e);
            }
        }
    }

    println!("\n🩺 Adapter health:");
    println!("{}", serde_json::to_string_pretty(&monitor.snapshot())?);

    Ok(if commit_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &ImportReport) {
    println!("\n📊 Import results for {}:", report.city);
    println!("   Imported: {}", report.imported);
    println!("   Deduped: {}", report.deduped);
    println!("   Candidates: {}", report.candidates);
    println!("   Rejected: {}", report.rejected_total());
    println!("   Unresolved venues: {}", report.unresolved_venues);
    println!("   Undated: {}", report.undated);
    println!("   Engagement restored: {}", report.restored_engagement);
    if report.geocoded > 0 {
        println!("   Geocoded: {}", report.geocoded);
    }
    if report.cancelled {
        println!("   🛑 Cancelled before commit");
    }
    if let Some(reason) = &report.skipped_commit {
        println!("   ⚠️  Commit skipped: {}", reason);
    }
    if !report.failed_adapters.is_empty() {
        println!("\n⚠️  Failed adapters:");
        for adapter in &report.failed_adapters {
            let reason = report.failure_reasons.get(adapter).map(String::as_str).unwrap_or("");
            println!("   - {} ({})", adapter, reason);
        }
    }
}
