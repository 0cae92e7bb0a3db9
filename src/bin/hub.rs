use std::collections::HashMap;

use anyhow::Context;
use clap::Parser;
use linkwatch::{
    config::{Config, StorageConfig, read_config_file},
    engine::Engine,
    storage,
    util::{get_config_path, get_db_path},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $LINKWATCH_CONFIG or ./linkwatch.json)
    #[arg(short)]
    file: Option<String>,

    /// Trace-level logging
    #[arg(long)]
    verbose: bool,
}

fn init(verbose: bool) {
    dotenv::dotenv().ok();

    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("linkwatch", level),
        ("linkwatch_hub", level),
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
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let path = args.file.unwrap_or_else(get_config_path);
    let config = match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("could not read {path} ({e}), using defaults");
            Config::default()
        }
    };

    let storage_config = storage_config(&config);
    let store = storage::open(&storage_config)
        .await
        .context("failed to open storage")?;

    let engine = Engine::start(store, file_settings(&config, &storage_config)).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    engine.shutdown().await
}

/// `LINKWATCH_DB` overrides the database path from the config file
fn storage_config(config: &Config) -> StorageConfig {
    let configured = config.storage.clone().unwrap_or_default();
    match (get_db_path(), configured) {
        (Some(path), StorageConfig::Sqlite { retention_days, .. }) => StorageConfig::Sqlite {
            path: path.into(),
            retention_days,
        },
        (_, configured) => configured,
    }
}

/// The storage retention doubles as the history retention setting unless
/// the file sets one explicitly
fn file_settings(config: &Config, storage: &StorageConfig) -> HashMap<String, String> {
    let mut settings = config.setting_pairs();
    if let StorageConfig::Sqlite { retention_days, .. } = storage {
        settings
            .entry("history_retention_days".to_string())
            .or_insert_with(|| retention_days.to_string());
    }
    settings
}
