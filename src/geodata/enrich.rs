//! Sequential enrichment pass: verified geodata, addresses, photos, and
//! directions links for every place.
//!
//! One place in flight at a time, with a courtesy delay between requests;
//! the service publishes no concurrency contract. Per-place failures are
//! logged and skipped; only store retry exhaustion aborts the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::assets;
use crate::config::Config;
use crate::db::{self, RetryPolicy, StoreError};
use crate::models::{FieldValue, GeoConfidence, Place};

use super::client::{best_photo, MapsClient, PlaceDetails};
use super::verify::{city_from_address, verify, Verdict, VerifyPolicy};

const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir/?api=1";

/// Provenance tag written with accepted coordinates.
const GEO_SOURCE: &str = "maps_place_details";

/// Counters for an enrichment run.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnrichStats {
    pub scanned: usize,
    pub updated: usize,
    pub photos: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Outcome {
    wrote: bool,
    photo: bool,
}

/// Run the enrichment pass over every place, in id order.
pub async fn enrich_all(
    pool: &SqlitePool,
    client: &MapsClient,
    config: &Config,
    policy: RetryPolicy,
    dry_run: bool,
) -> Result<EnrichStats> {
    let places = db::load_places(pool).await?;
    if places.is_empty() {
        info!("No rows in places; seed data first, then re-run");
        return Ok(EnrichStats::default());
    }

    if !dry_run {
        std::fs::create_dir_all(&config.asset_dir)?;
    }

    let pb = ProgressBar::new(places.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut stats = EnrichStats::default();
    for place in &places {
        pb.set_message(place.name.clone());
        stats.scanned += 1;

        let outcome = enrich_one(pool, client, config, policy, place, dry_run).await?;
        if outcome.wrote {
            stats.updated += 1;
        }
        if outcome.photo {
            stats.photos += 1;
        }

        pb.inc(1);
        // Be polite with API quotas.
        tokio::time::sleep(Duration::from_millis(config.courtesy_delay_ms)).await;
    }
    pb.finish_and_clear();

    Ok(stats)
}

/// Enrich a single place. Network and decoding failures only skip the
/// affected sub-step; the returned error is reserved for the store.
async fn enrich_one(
    pool: &SqlitePool,
    client: &MapsClient,
    config: &Config,
    policy: RetryPolicy,
    place: &Place,
    dry_run: bool,
) -> std::result::Result<Outcome, StoreError> {
    let search_text = build_search_text(place);
    if search_text.is_empty() {
        debug!("Skipping id={} with no searchable text", place.id);
        return Ok(Outcome::default());
    }

    let candidate = match client.find_place(&search_text, place.coords()).await {
        Ok(c) => c,
        Err(e) => {
            warn!("FindPlace failed for '{}' (id={}): {}", place.name, place.id, e);
            None
        }
    };
    let place_id = candidate.as_ref().and_then(|c| c.place_id.clone());

    let mut details = PlaceDetails::default();
    if let Some(pid) = place_id.as_deref() {
        match client.place_details(pid).await {
            Ok(d) => details = d,
            Err(e) => warn!("Place details failed for {} (id={}): {}", pid, place.id, e),
        }
    }

    let mut formatted = details
        .formatted_address
        .clone()
        .or_else(|| candidate.as_ref().and_then(|c| c.formatted_address.clone()))
        .filter(|a| !a.trim().is_empty());

    // No formatted address anywhere, but coordinates on file: reverse
    // geocode those instead.
    if formatted.is_none() {
        if let Some((lat, lon)) = place.coords() {
            match client.reverse_geocode(lat, lon).await {
                Ok(addr) => formatted = addr,
                Err(e) => warn!(
                    "Reverse geocode failed for '{}' (id={}): {}",
                    place.name, place.id, e
                ),
            }
        }
    }

    let mut updates = geodata_updates(
        config,
        place,
        place_id.as_deref(),
        details.lat.zip(details.lon),
        formatted.as_deref(),
    );

    let mut outcome = Outcome::default();

    if needs_photo(place) {
        if let Some(photo_ref) = candidate.as_ref().and_then(|c| best_photo(&c.photos)) {
            let (out, url) = planned_photo(config, place);
            if dry_run {
                info!(
                    "[dry-run] id={} '{}': would download a photo to {}",
                    place.id,
                    place.name,
                    out.display()
                );
                updates.push(("photo_url", FieldValue::Text(Some(url))));
                outcome.photo = true;
            } else {
                match client.download_photo(photo_ref, &out).await {
                    Ok(true) => {
                        updates.push(("photo_url", FieldValue::Text(Some(url))));
                        outcome.photo = true;
                    }
                    Ok(false) => warn!(
                        "Photo for '{}' (id={}) was not image content; skipped",
                        place.name, place.id
                    ),
                    Err(e) => warn!(
                        "Photo download failed for '{}' (id={}): {}",
                        place.name, place.id, e
                    ),
                }
            }
        }
    }

    if updates.is_empty() {
        return Ok(outcome);
    }

    let columns: Vec<&str> = updates.iter().map(|(c, _)| *c).collect();
    if dry_run {
        info!(
            "[dry-run] id={} '{}': would set {}",
            place.id,
            place.name,
            columns.join(", ")
        );
        outcome.wrote = true;
        return Ok(outcome);
    }

    debug!("id={}: writing {}", place.id, columns.join(", "));
    let updates_ref = &updates;
    db::with_retry(policy, "enrich place", db::is_busy, move || async move {
        let mut tx = pool.begin().await?;
        db::update_columns(&mut *tx, place.id, updates_ref).await?;
        tx.commit().await?;
        Ok(())
    })
    .await?;

    outcome.wrote = true;
    Ok(outcome)
}

/// Column updates implied by the resolved geodata for one place: verified
/// or annotated coordinates, a refreshed address, and the directions link.
///
/// Pure over its inputs so the verdict-to-column mapping is testable
/// without a network. Rejected candidates never touch `lat`/`lon`; the
/// address refresh is independent of the coordinate verdict.
fn geodata_updates(
    config: &Config,
    place: &Place,
    place_id: Option<&str>,
    candidate_coords: Option<(f64, f64)>,
    formatted: Option<&str>,
) -> Vec<(&'static str, FieldValue)> {
    let mut updates: Vec<(&'static str, FieldValue)> = Vec::new();
    let mut final_coords = place.coords();

    if let Some((lat, lon)) = candidate_coords {
        let (expected_city, expected_state) = expected_locality(config, place);
        let verdict = verify(
            VerifyPolicy {
                max_drift_km: config.max_drift_km,
                strict_locality: config.strict_locality,
            },
            place.coords(),
            (lat, lon),
            formatted,
            expected_city.as_deref(),
            expected_state.as_deref(),
        );

        match verdict {
            Verdict::Accepted { distance_km } => {
                updates.push(("lat", FieldValue::Real(Some(lat))));
                updates.push(("lon", FieldValue::Real(Some(lon))));
                updates.push(("geo_source", FieldValue::Text(Some(GEO_SOURCE.to_string()))));
                updates.push((
                    "geo_confidence",
                    FieldValue::Text(Some(GeoConfidence::Verified.as_str().to_string())),
                ));
                updates.push(("geo_distance_km", FieldValue::Real(distance_km)));
                final_coords = Some((lat, lon));
            }
            rejected => {
                warn!(
                    "Rejecting coordinates for '{}' (id={}): {:?}",
                    place.name, place.id, rejected
                );
                // Annotate the audit trail; stored coordinates stay as-is.
                if let Some(d) = rejected.distance_km() {
                    updates.push((
                        "geo_confidence",
                        FieldValue::Text(Some(
                            GeoConfidence::OriginalOrUnverified.as_str().to_string(),
                        )),
                    ));
                    updates.push(("geo_distance_km", FieldValue::Real(Some(d))));
                }
            }
        }
    }

    // Text corrections are lower-risk than coordinate overwrites, so the
    // address refreshes regardless of the verification outcome.
    let mut final_address = place.address.clone();
    if let Some(addr) = formatted {
        if place.address.as_deref() != Some(addr) {
            updates.push(("address", FieldValue::Text(Some(addr.to_string()))));
            final_address = Some(addr.to_string());
        }
    }

    // Cheap and idempotent: the directions link is refreshed whenever it
    // differs from what is stored.
    let directions = directions_url(place_id, final_coords, final_address.as_deref(), &place.name);
    if place.directions_url.as_deref() != Some(directions.as_str()) {
        updates.push(("directions_url", FieldValue::Text(Some(directions))));
    }

    updates
}

/// A photo is only fetched for rows with no image reference in any alias
/// column; existing references are never replaced.
fn needs_photo(place: &Place) -> bool {
    place.photo_ref().is_none()
}

/// Target file and public URL a photo download would produce.
fn planned_photo(config: &Config, place: &Place) -> (PathBuf, String) {
    let out = photo_path(&config.asset_dir, &place.name, place.id);
    let file = out
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let url = format!("{}/static/{}", config.public_base, assets::rel_ref(&file));
    (out, url)
}

/// Free-text search query: name + address + city + state, whichever are
/// non-empty.
fn build_search_text(place: &Place) -> String {
    let mut parts: Vec<&str> = vec![place.name.trim()];
    for extra in [&place.address, &place.city, &place.state] {
        if let Some(v) = extra.as_deref() {
            parts.push(v.trim());
        }
    }
    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

/// City/state the formatted address is expected to mention under strict
/// checking. Falls back to parsing the stored address when the row has no
/// city of its own.
fn expected_locality(config: &Config, place: &Place) -> (Option<String>, Option<String>) {
    if !config.strict_locality {
        return (None, None);
    }
    let city = place
        .city
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| place.address.as_deref().and_then(city_from_address));
    let state = place.state.clone().filter(|s| !s.trim().is_empty());
    (city, state)
}

/// Directions link from the best available identifier: external place id,
/// else coordinates, else address, else name.
pub fn directions_url(
    place_id: Option<&str>,
    coords: Option<(f64, f64)>,
    address: Option<&str>,
    name: &str,
) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    if let Some(pid) = place_id {
        params.append_pair("destination_place_id", pid);
    }
    if let Some((lat, lon)) = coords {
        params.append_pair("destination", &format!("{},{}", lat, lon));
    } else if let Some(addr) = address.filter(|a| !a.trim().is_empty()) {
        params.append_pair("destination", addr);
    } else {
        params.append_pair("destination", name);
    }
    format!("{}&{}", DIRECTIONS_BASE, params.finish())
}

/// Filesystem-safe slug: lowercase ASCII alphanumerics, runs of anything
/// else collapsed to single hyphens.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_hyphen = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Target path for a downloaded photo, disambiguating collisions with a
/// numeric suffix.
fn photo_path(dir: &Path, name: &str, id: i64) -> PathBuf {
    let mut stem = slugify(name);
    if stem.is_empty() {
        stem = format!("place-{}", id);
    }

    let mut out = dir.join(format!("{}.jpg", stem));
    let mut suffix = 1;
    while out.exists() {
        out = dir.join(format!("{}-{}.jpg", stem, suffix));
        suffix += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_path: PathBuf::from("dev.db"),
            asset_dir: PathBuf::from("static/places"),
            public_base: "http://localhost:8000".to_string(),
            maps_api_key: None,
            bias_radius_m: 50_000,
            max_drift_km: 50.0,
            strict_locality: false,
            region_code: "us".to_string(),
            courtesy_delay_ms: 0,
        }
    }

    fn columns(updates: &[(&'static str, FieldValue)]) -> Vec<&'static str> {
        updates.iter().map(|(c, _)| *c).collect()
    }

    const DALLAS: (f64, f64) = (32.7767, -96.7970);

    #[test]
    fn rejected_drift_annotates_without_touching_coordinates() {
        let config = test_config();
        let place = Place {
            id: 1,
            name: "Spot".to_string(),
            lat: Some(DALLAS.0),
            lon: Some(DALLAS.1),
            ..Default::default()
        };
        // About 80 km due north, well past the 50 km limit.
        let candidate = (DALLAS.0 + 0.7194, DALLAS.1);

        let updates = geodata_updates(&config, &place, Some("abc"), Some(candidate), None);
        let cols = columns(&updates);
        assert!(!cols.contains(&"lat"));
        assert!(!cols.contains(&"lon"));
        assert!(!cols.contains(&"geo_source"));

        let confidence = updates.iter().find(|(c, _)| *c == "geo_confidence").unwrap();
        assert_eq!(
            confidence.1,
            FieldValue::Text(Some("original_or_unverified".to_string()))
        );
        let distance = updates.iter().find(|(c, _)| *c == "geo_distance_km").unwrap();
        match distance.1 {
            FieldValue::Real(Some(d)) => assert!((79.0..81.0).contains(&d), "distance {}", d),
            ref other => panic!("unexpected distance value {:?}", other),
        }
    }

    #[test]
    fn accepted_candidate_writes_coordinates_and_provenance() {
        let config = test_config();
        let place = Place {
            id: 1,
            name: "Spot".to_string(),
            lat: Some(DALLAS.0),
            lon: Some(DALLAS.1),
            ..Default::default()
        };
        // A couple of kilometers away, comfortably inside the limit.
        let candidate = (32.79, -96.80);

        let updates = geodata_updates(&config, &place, Some("abc"), Some(candidate), None);
        let cols = columns(&updates);
        assert!(cols.contains(&"lat"));
        assert!(cols.contains(&"lon"));
        assert!(cols.contains(&"directions_url"));

        let source = updates.iter().find(|(c, _)| *c == "geo_source").unwrap();
        assert_eq!(
            source.1,
            FieldValue::Text(Some("maps_place_details".to_string()))
        );
        let confidence = updates.iter().find(|(c, _)| *c == "geo_confidence").unwrap();
        assert_eq!(confidence.1, FieldValue::Text(Some("verified".to_string())));
        assert!(cols.contains(&"geo_distance_km"));
    }

    #[test]
    fn address_refreshes_even_when_coordinates_are_rejected() {
        let config = test_config();
        let place = Place {
            id: 1,
            name: "Spot".to_string(),
            address: Some("old address".to_string()),
            lat: Some(DALLAS.0),
            lon: Some(DALLAS.1),
            ..Default::default()
        };
        let candidate = (DALLAS.0 + 0.7194, DALLAS.1);

        let updates = geodata_updates(
            &config,
            &place,
            None,
            Some(candidate),
            Some("1 Main St, Arlington, TX"),
        );
        let cols = columns(&updates);
        assert!(!cols.contains(&"lat"));
        let address = updates.iter().find(|(c, _)| *c == "address").unwrap();
        assert_eq!(
            address.1,
            FieldValue::Text(Some("1 Main St, Arlington, TX".to_string()))
        );
    }

    #[test]
    fn unchanged_rows_produce_no_updates() {
        let config = test_config();
        let mut place = Place {
            id: 1,
            name: "Spot".to_string(),
            ..Default::default()
        };
        place.directions_url = Some(directions_url(None, None, None, &place.name));

        let updates = geodata_updates(&config, &place, None, None, None);
        assert!(updates.is_empty());
    }

    #[test]
    fn existing_image_reference_blocks_photo_downloads() {
        let mut place = Place {
            id: 1,
            name: "Spot".to_string(),
            ..Default::default()
        };
        assert!(needs_photo(&place));

        place.photo_url = Some("places/spot.jpg".to_string());
        assert!(!needs_photo(&place));

        place.photo_url = None;
        place.image_url = Some("places/spot.jpg".to_string());
        assert!(!needs_photo(&place));
    }

    #[test]
    fn planned_photo_targets_the_public_static_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.asset_dir = dir.path().to_path_buf();

        let place = Place {
            id: 1,
            name: "Joe's Diner".to_string(),
            ..Default::default()
        };
        let (out, url) = planned_photo(&config, &place);
        assert_eq!(out.file_name().unwrap(), "joe-s-diner.jpg");
        assert_eq!(url, "http://localhost:8000/static/places/joe-s-diner.jpg");
    }

    #[test]
    fn slug_strips_punctuation_and_case() {
        assert_eq!(slugify("Joe's Diner"), "joe-s-diner");
        assert_eq!(slugify("  The  Park!  "), "the-park");
        assert_eq!(slugify("Café 21"), "caf-21");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn photo_path_appends_numeric_suffixes_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let first = photo_path(dir.path(), "Joe's Diner", 1);
        assert_eq!(first.file_name().unwrap(), "joe-s-diner.jpg");
        std::fs::write(&first, b"x").unwrap();

        let second = photo_path(dir.path(), "Joe's Diner", 1);
        assert_eq!(second.file_name().unwrap(), "joe-s-diner-1.jpg");
        std::fs::write(&second, b"x").unwrap();

        let third = photo_path(dir.path(), "Joe's Diner", 1);
        assert_eq!(third.file_name().unwrap(), "joe-s-diner-2.jpg");
    }

    #[test]
    fn photo_path_falls_back_to_the_row_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo_path(dir.path(), "???", 42);
        assert_eq!(path.file_name().unwrap(), "place-42.jpg");
    }

    #[test]
    fn directions_prefer_place_id_then_coords_then_address_then_name() {
        let with_pid = directions_url(Some("abc"), Some((1.0, 2.0)), Some("addr"), "name");
        assert!(with_pid.contains("destination_place_id=abc"));
        assert!(with_pid.contains("destination=1%2C2"));

        let coords_only = directions_url(None, Some((32.5, -97.0)), Some("addr"), "name");
        assert!(coords_only.contains("destination=32.5%2C-97"));

        let addr_only = directions_url(None, None, Some("1 Main St, City"), "name");
        assert!(addr_only.contains("destination=1+Main+St%2C+City"));

        let name_only = directions_url(None, None, None, "Joe's Diner");
        assert!(name_only.contains("destination=Joe%27s+Diner"));
        assert!(name_only.starts_with(DIRECTIONS_BASE));
    }

    #[test]
    fn search_text_joins_non_empty_parts() {
        let place = Place {
            name: "Joe's Diner".to_string(),
            address: Some("1 Main St".to_string()),
            city: Some("  ".to_string()),
            state: Some("TX".to_string()),
            ..Default::default()
        };
        assert_eq!(build_search_text(&place), "Joe's Diner 1 Main St TX");

        let unnamed = Place::default();
        assert_eq!(build_search_text(&unnamed), "");
    }
}
