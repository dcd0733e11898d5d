use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use energy_store::{
    actors::collector::CollectorHandle,
    codec::{Day, Interval},
    config::{Config, read_config_file},
    source::{JsonFileSource, parse_records},
    storage::{ConnectionDescriptor, PoolSettings, StorageBackend},
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "energy-store", version, about = "Store and query energy market measurements")]
struct Args {
    /// Storage descriptor (cache://, sqlite://path, mysql://..., postgres://...)
    #[arg(long, global = true)]
    storage: Option<String>,

    /// Config file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Upsert records from a JSON array of [namespace, date, time, tag, value]
    Import { file: String },

    /// Print one day, or a range of days, as JSON
    Query {
        namespace: String,

        /// Day as DD-MM-YYYY
        date: Day,

        /// Last day of a range (inclusive)
        #[arg(long)]
        to: Option<Day>,

        /// HH:MM, hour, day, month or all
        #[arg(long, default_value = "all")]
        time: Interval,

        #[arg(long)]
        tag: Option<String>,
    },

    /// Print the most recent stored day of a namespace
    Latest { namespace: String },

    /// Print the number of stored entries
    Size,

    /// Delete all stored data
    Clear,

    /// Check that the storage engine is reachable
    Health,

    /// Run the collector from the config file until interrupted
    Collect {
        /// JSON file of records, rewritten by an external scraper
        source: String,
    },
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("energy_store", LevelFilter::DEBUG),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let descriptor: ConnectionDescriptor = config
        .storage_uri(args.storage.as_deref())
        .parse()
        .context("invalid storage descriptor")?;
    let backend = descriptor
        .open(&PoolSettings::from(&config.pool))
        .await
        .with_context(|| format!("failed to open storage {descriptor}"))?;

    let result = run(args.command, &config, backend.clone()).await;
    backend.close().await?;
    result
}

async fn run(
    command: Command,
    config: &Config,
    backend: Arc<dyn StorageBackend>,
) -> anyhow::Result<()> {
    match command {
        Command::Import { file } => {
            let content =
                std::fs::read_to_string(&file).with_context(|| format!("failed to read {file}"))?;
            let points = parse_records(&content)?;
            let count = points.len();
            backend.bulk_insert(points).await?;
            println!("imported {count} records");
        }

        Command::Query {
            namespace,
            date,
            to,
            time,
            tag,
        } => {
            let result = match to {
                Some(to) => {
                    backend
                        .retrieve_range(&namespace, date, to, tag.as_deref(), time)
                        .await?
                }
                None => backend.retrieve(&namespace, date, time, tag.as_deref()).await?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Latest { namespace } => match backend.latest_date(&namespace).await? {
            Some(day) => println!("{day}"),
            None => println!("no data for {namespace}"),
        },

        Command::Size => println!("{}", backend.size().await?),

        Command::Clear => {
            backend.clear().await?;
            info!("storage cleared");
        }

        Command::Health => {
            let health = backend.health_check().await?;
            println!("{}", health.message);
            for (key, value) in &health.metadata {
                println!("  {key}: {value}");
            }
            if !health.healthy {
                anyhow::bail!("storage is unhealthy");
            }
        }

        Command::Collect { source } => {
            let collector = config
                .collector
                .clone()
                .context("the config file has no collector section")?;
            debug!("collecting {} every {}s", collector.namespace, collector.interval_secs);

            let handle =
                CollectorHandle::spawn(collector, Arc::new(JsonFileSource::new(source)), backend);

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            info!("interrupted, stopping collector");
            handle.shutdown().await?;
        }
    }

    Ok(())
}
