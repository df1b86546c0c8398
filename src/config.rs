//! Process configuration, read once at startup and passed into components.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Pipeline configuration.
///
/// Built once in each binary's `main` and handed to component constructors;
/// component logic never reads the environment itself.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Directory holding place images (`<asset_dir>/<filename>`).
    pub asset_dir: PathBuf,
    /// Public base URL the serving API exposes static files under.
    pub public_base: String,
    /// Maps service credential. Only the enrichment stage requires it.
    pub maps_api_key: Option<String>,
    /// Location bias radius for place search, in meters.
    pub bias_radius_m: u32,
    /// Maximum accepted drift between stored and candidate coordinates.
    pub max_drift_km: f64,
    /// Require the formatted address to contain the row's city/state.
    pub strict_locality: bool,
    /// Region code passed to the place search.
    pub region_code: String,
    /// Delay between places during enrichment, to respect API quotas.
    pub courtesy_delay_ms: u64,
}

impl Config {
    /// Load configuration from the environment. Never fails; missing
    /// credentials are only an error for stages that need them.
    pub fn load() -> Self {
        let database_path = env::var("TAMARACK_DB")
            .ok()
            .or_else(|| {
                // Accept a sqlite:// DATABASE_URL for compatibility with the API.
                env::var("DATABASE_URL")
                    .ok()
                    .and_then(|u| u.strip_prefix("sqlite://").map(str::to_string))
            })
            .unwrap_or_else(|| "dev.db".to_string());

        Self {
            database_path: PathBuf::from(database_path),
            asset_dir: PathBuf::from(
                env::var("TAMARACK_ASSET_DIR").unwrap_or_else(|_| "static/places".to_string()),
            ),
            public_base: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            maps_api_key: env::var("MAPS_API_KEY").ok().filter(|k| !k.is_empty()),
            bias_radius_m: parse_env("GEO_BIAS_RADIUS_M", 50_000),
            max_drift_km: parse_env("GEO_MAX_DRIFT_KM", 50.0),
            strict_locality: parse_env("GEO_STRICT_LOCALITY", false),
            region_code: env::var("GEO_REGION").unwrap_or_else(|_| "us".to_string()),
            courtesy_delay_ms: parse_env("GEO_DELAY_MS", 250),
        }
    }

    /// The maps credential, or a fatal error for stages that cannot run
    /// without it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.maps_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("MAPS_API_KEY is not set"))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_an_error() {
        let mut config = Config::load();
        config.maps_api_key = None;
        assert!(config.require_api_key().is_err());

        config.maps_api_key = Some("k".to_string());
        assert_eq!(config.require_api_key().unwrap(), "k");
    }
}
