//! Enrich places with verified geodata, photos, and directions links.
//!
//! Requires the maps service credential; everything else degrades
//! per-record.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tamarack::db::{self, RetryPolicy};
use tamarack::geodata::{enrich_all, MapsClient};
use tamarack::Config;

#[derive(Parser, Debug)]
#[command(name = "enrich")]
#[command(about = "Fetch verified addresses, coordinates, photos, and directions links")]
struct Args {
    /// Database file override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Asset directory override (downloaded photos land here)
    #[arg(long)]
    asset_dir: Option<PathBuf>,

    /// Resolve and print intended changes without writing or downloading
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::load();
    if let Some(path) = args.db {
        config.database_path = path;
    }
    if let Some(dir) = args.asset_dir {
        config.asset_dir = dir;
    }

    // Fatal before any work: a pipeline without a credential cannot do
    // anything useful.
    let client = MapsClient::new(&config)?;

    let pool = db::connect(&config.database_path).await?;
    db::ensure_schema(&pool).await?;

    let stats = enrich_all(&pool, &client, &config, RetryPolicy::default(), args.dry_run).await?;

    if args.dry_run {
        info!(
            "[dry-run] Scanned {} place(s); {} would be updated, {} photo(s) would be downloaded",
            stats.scanned, stats.updated, stats.photos
        );
    } else {
        info!(
            "Done. Scanned {} place(s), updated {}, downloaded {} photo(s)",
            stats.scanned, stats.updated, stats.photos
        );
    }
    Ok(())
}
