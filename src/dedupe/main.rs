//! Remove duplicate place rows.
//!
//! Groups places by a fuzzy identity key, keeps the most complete row per
//! group, backfills its gaps from the duplicates, and deletes the rest.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tamarack::db::{self, RetryPolicy};
use tamarack::merge::{apply_merge, plan_merges};
use tamarack::Config;

#[derive(Parser, Debug)]
#[command(name = "dedupe-places")]
#[command(about = "Remove duplicate place rows, merging their data into one survivor")]
struct Args {
    /// Database file override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Print intended changes without writing
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

    let pool = db::connect(&config.database_path).await?;
    db::ensure_schema(&pool).await?;

    let rows = db::load_places(&pool).await?;
    info!("Loaded {} place(s)", rows.len());

    let plans = plan_merges(&rows);
    if plans.is_empty() {
        info!("No duplicate groups found");
        return Ok(());
    }

    let mut removed = 0u64;
    if args.dry_run {
        for plan in &plans {
            info!(
                "[dry-run] group {}: keep id={}, delete {:?}",
                plan.key, plan.survivor_id, plan.delete_ids
            );
            removed += plan.delete_ids.len() as u64;
        }
        info!(
            "[dry-run] Duplicate groups: {}; rows that would be removed: {}",
            plans.len(),
            removed
        );
        return Ok(());
    }

    for plan in &plans {
        removed += apply_merge(&pool, RetryPolicy::default(), plan).await?;
    }

    info!("Deduped groups: {}; removed rows: {}", plans.len(), removed);
    Ok(())
}
