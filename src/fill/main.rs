//! Populate missing place images from slug-named static files.
//!
//! Rows with no photo reference under any alias get both aliases pointed
//! at `<asset-dir>/<slug(name)>.<ext>` when such a file exists.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tamarack::assets;
use tamarack::db::{self, RetryPolicy};
use tamarack::geodata::slugify;
use tamarack::models::FieldValue;
use tamarack::Config;

/// Probe order for candidate files.
const PROBE_EXTS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Parser, Debug)]
#[command(name = "fill-images")]
#[command(about = "Point image-less places at matching static files")]
struct Args {
    /// Database file override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Asset directory override
    #[arg(long)]
    asset_dir: Option<PathBuf>,

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

    let pool = db::connect(&config.database_path).await?;
    db::ensure_schema(&pool).await?;
    let rows = db::load_places(&pool).await?;

    let mut updated = 0usize;
    for place in &rows {
        if place.photo_ref().is_some() {
            continue;
        }
        let slug = slugify(&place.name);
        if slug.is_empty() {
            continue;
        }

        let Some(file) = PROBE_EXTS
            .iter()
            .map(|ext| format!("{}.{}", slug, ext))
            .find(|f| config.asset_dir.join(f).is_file())
        else {
            continue;
        };
        let rel = assets::rel_ref(&file);
        info!("id={} -> {}", place.id, rel);

        if args.dry_run {
            updated += 1;
            continue;
        }

        let pool_ref = &pool;
        let id = place.id;
        let updates = vec![
            ("image_url", FieldValue::Text(Some(rel.clone()))),
            ("photo_url", FieldValue::Text(Some(rel.clone()))),
        ];
        let updates_ref = &updates;
        db::with_retry(
            RetryPolicy::default(),
            "fill image",
            db::is_busy,
            move || async move {
                let mut tx = pool_ref.begin().await?;
                db::update_columns(&mut *tx, id, updates_ref).await?;
                tx.commit().await?;
                Ok(())
            },
        )
        .await?;
        updated += 1;
    }

    if args.dry_run {
        info!("[dry-run] Would update {} row(s)", updated);
    } else {
        info!("Updated {} row(s)", updated);
    }
    Ok(())
}
