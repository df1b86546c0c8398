//! SQLite access: pool bootstrap, schema, row loading, and field updates.

pub mod retry;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::query::Query;
use sqlx::{Sqlite, SqliteConnection};
use tracing::info;

use crate::models::{FieldValue, Place};

pub use retry::{is_busy, with_retry, RetryPolicy, StoreError};

/// Open the database with the same pragmas the serving API uses:
/// WAL journaling and a generous busy timeout, since the API may be
/// writing while a pipeline stage runs.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    info!("Opening database at {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    Ok(pool)
}

/// Enrichment columns added after the original seed schema. Applied
/// additively so every stage can run against an old database file.
const EXTRA_COLUMNS: [&str; 10] = [
    "price_level INTEGER",
    "image_url TEXT",
    "maps_url TEXT",
    "photo_url TEXT",
    "directions_url TEXT",
    "geo_source TEXT",
    "geo_confidence TEXT",
    "geo_distance_km REAL",
    "city TEXT",
    "state TEXT",
];

/// Create the `places` table if needed and add any missing columns.
/// Safe to run repeatedly.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS places (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT,
            description TEXT,
            address TEXT,
            lat REAL,
            lon REAL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create places table")?;

    for column in EXTRA_COLUMNS {
        let result = sqlx::query(&format!("ALTER TABLE places ADD COLUMN {}", column))
            .execute(pool)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column name") => {}
            Err(e) => return Err(e).context(format!("Failed to add column {}", column)),
        }
    }

    Ok(())
}

/// Load all place rows in id order.
pub async fn load_places(pool: &SqlitePool) -> Result<Vec<Place>> {
    let rows = sqlx::query_as::<_, Place>(
        "SELECT id, name, category, city, state, description, address, lat, lon,
                price_level, image_url, photo_url, maps_url, directions_url,
                geo_source, geo_confidence, geo_distance_km
         FROM places
         ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to load places")?;

    Ok(rows)
}

/// Bind one typed field value onto a query.
pub fn bind_field<'q>(
    query: Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &FieldValue,
) -> Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        FieldValue::Text(v) => query.bind(v.clone()),
        FieldValue::Real(v) => query.bind(*v),
        FieldValue::Int(v) => query.bind(*v),
    }
}

/// Update a named subset of columns on one row.
pub async fn update_columns(
    conn: &mut SqliteConnection,
    id: i64,
    updates: &[(&str, FieldValue)],
) -> std::result::Result<(), sqlx::Error> {
    if updates.is_empty() {
        return Ok(());
    }

    let set_clause = updates
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE places SET {} WHERE id = ?", set_clause);

    let mut query = sqlx::query(&sql);
    for (_, value) in updates {
        query = bind_field(query, value);
    }
    query.bind(id).execute(conn).await?;

    Ok(())
}

/// In-memory database for tests.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database")
}
