//! Deduplicate place photos on disk and repoint database references.
//!
//! Byte-identical images collapse to one canonical file; every relative
//! image reference is rewritten to the canonical path. Absolute URLs are
//! external and never touched.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tamarack::assets::{normalize_ref, DuplicateIndex};
use tamarack::db::{self, RetryPolicy};
use tamarack::models::FieldValue;
use tamarack::Config;

#[derive(Parser, Debug)]
#[command(name = "dedupe-photos")]
#[command(about = "Deduplicate static place photos and fix database references")]
struct Args {
    /// Database file override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Asset directory override
    #[arg(long)]
    asset_dir: Option<PathBuf>,

    /// Remove duplicate files after updating the database
    #[arg(long)]
    delete_files: bool,

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
    if let Some(dir) = args.asset_dir {
        config.asset_dir = dir;
    }

    if !config.asset_dir.is_dir() {
        anyhow::bail!("Asset directory not found: {}", config.asset_dir.display());
    }

    let index = DuplicateIndex::build(&config.asset_dir);
    info!(
        "Indexed {} distinct image(s), {} duplicate file(s)",
        index.distinct_hashes(),
        index.duplicate_count()
    );
    if index.duplicate_count() == 0 {
        info!("No duplicate assets found");
        return Ok(());
    }

    let pool = db::connect(&config.database_path).await?;
    db::ensure_schema(&pool).await?;
    let rows = db::load_places(&pool).await?;

    let mut rows_updated = 0usize;
    for place in &rows {
        let mut updates: Vec<(&str, FieldValue)> = Vec::new();
        for (column, stored) in [("image_url", &place.image_url), ("photo_url", &place.photo_url)]
        {
            if let Some(rel) = stored.as_deref().and_then(normalize_ref) {
                if let Some(canonical) = index.canonical_for(&rel) {
                    updates.push((column, FieldValue::Text(Some(canonical.to_string()))));
                }
            }
        }
        if updates.is_empty() {
            continue;
        }

        if args.dry_run {
            let columns: Vec<&str> = updates.iter().map(|(c, _)| *c).collect();
            info!(
                "[dry-run] id={}: would repoint {}",
                place.id,
                columns.join(", ")
            );
            rows_updated += 1;
            continue;
        }

        let pool_ref = &pool;
        let updates_ref = &updates;
        let id = place.id;
        db::with_retry(
            RetryPolicy::default(),
            "repoint photo refs",
            db::is_busy,
            move || async move {
                let mut tx = pool_ref.begin().await?;
                db::update_columns(&mut *tx, id, updates_ref).await?;
                tx.commit().await?;
                Ok(())
            },
        )
        .await?;
        rows_updated += 1;
    }

    let mut files_deleted = 0usize;
    if args.delete_files && !args.dry_run {
        for file in index.duplicate_files() {
            let path = config.asset_dir.join(&file);
            match std::fs::remove_file(&path) {
                Ok(()) => files_deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    if args.dry_run {
        let would_delete = if args.delete_files {
            index.duplicate_count()
        } else {
            0
        };
        info!(
            "[dry-run] Would update {} row(s) and delete {} file(s)",
            rows_updated, would_delete
        );
    } else {
        info!(
            "Updated {} row(s) and deleted {} file(s)",
            rows_updated, files_deleted
        );
    }
    Ok(())
}
