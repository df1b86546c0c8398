//! HTTP client for the maps service.
//!
//! Four request types: free-text place search (with optional location
//! bias), place-detail lookup, reverse geocoding, and photo content
//! retrieval. One static credential authenticates all of them.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

const FIND_PLACE_URL: &str = "https://maps.googleapis.com/maps/api/place/findplacefromtext/json";
const PLACE_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";
const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";
const REVERSE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Width cap requested for downloaded photos.
const PHOTO_MAX_WIDTH: u32 = 1600;

/// Client for the external maps/geocoding service.
pub struct MapsClient {
    http: Client,
    api_key: String,
    bias_radius_m: u32,
    region: String,
}

/// A search candidate returned by find-place.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub place_id: Option<String>,
    pub formatted_address: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub photos: Vec<PhotoMeta>,
    pub geometry: Option<Geometry>,
}

/// Photo metadata attached to a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoMeta {
    pub photo_reference: Option<String>,
    #[serde(default)]
    pub width: u64,
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Precise geometry and address from the detail lookup.
#[derive(Debug, Default, Clone)]
pub struct PlaceDetails {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindPlaceResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    result: Option<DetailsResult>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    geometry: Option<Geometry>,
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    results: Vec<ReverseResult>,
}

#[derive(Debug, Deserialize)]
struct ReverseResult {
    formatted_address: Option<String>,
}

impl MapsClient {
    /// Build a client from configuration. Fails when the credential is
    /// missing; enrichment cannot run without it.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let http = Client::builder()
            .user_agent("tamarack/0.1 (place catalog pipeline)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key,
            bias_radius_m: config.bias_radius_m,
            region: config.region_code.clone(),
        })
    }

    /// Free-text search, optionally biased toward existing coordinates to
    /// disambiguate common names. Returns the first candidate, if any.
    pub async fn find_place(
        &self,
        query: &str,
        bias: Option<(f64, f64)>,
    ) -> Result<Option<Candidate>> {
        let mut params = vec![
            ("input", query.to_string()),
            ("inputtype", "textquery".to_string()),
            (
                "fields",
                "place_id,geometry,photos,formatted_address,name".to_string(),
            ),
            ("region", self.region.clone()),
            ("key", self.api_key.clone()),
        ];
        if let Some((lat, lon)) = bias {
            params.push((
                "locationbias",
                format!("circle:{}@{},{}", self.bias_radius_m, lat, lon),
            ));
        }

        debug!("find_place query={:?} biased={}", query, bias.is_some());
        let response = self
            .http
            .get(FIND_PLACE_URL)
            .query(&params)
            .timeout(Duration::from_secs(20))
            .send()
            .await?
            .error_for_status()?;
        let data: FindPlaceResponse = response.json().await?;
        Ok(data.candidates.into_iter().next())
    }

    /// Fetch precise geometry and the formatted address for a candidate.
    pub async fn place_details(&self, place_id: &str) -> Result<PlaceDetails> {
        let response = self
            .http
            .get(PLACE_DETAILS_URL)
            .query(&[
                ("place_id", place_id),
                ("fields", "geometry,formatted_address,name"),
                ("key", &self.api_key),
            ])
            .timeout(Duration::from_secs(20))
            .send()
            .await?
            .error_for_status()?;
        let data: DetailsResponse = response.json().await?;

        let mut details = PlaceDetails::default();
        if let Some(result) = data.result {
            if let Some(location) = result.geometry.and_then(|g| g.location) {
                details.lat = Some(location.lat);
                details.lon = Some(location.lng);
            }
            details.formatted_address = result.formatted_address;
        }
        Ok(details)
    }

    /// Formatted address for a coordinate pair, if the service knows one.
    pub async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let response = self
            .http
            .get(REVERSE_GEOCODE_URL)
            .query(&[
                ("latlng", format!("{},{}", lat, lon)),
                ("key", self.api_key.clone()),
            ])
            .timeout(Duration::from_secs(15))
            .send()
            .await?
            .error_for_status()?;
        let data: ReverseResponse = response.json().await?;
        Ok(data
            .results
            .into_iter()
            .next()
            .and_then(|r| r.formatted_address))
    }

    /// Download photo content to `out`. Returns false (and writes nothing)
    /// when the response is not an image.
    pub async fn download_photo(&self, photo_reference: &str, out: &Path) -> Result<bool> {
        let response = self
            .http
            .get(PHOTO_URL)
            .query(&[
                ("maxwidth", PHOTO_MAX_WIDTH.to_string()),
                ("photo_reference", photo_reference.to_string()),
                ("key", self.api_key.clone()),
            ])
            .timeout(Duration::from_secs(60))
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("image") {
            return Ok(false);
        }

        let bytes = response.bytes().await?;
        std::fs::write(out, &bytes)
            .with_context(|| format!("Failed to write photo to {}", out.display()))?;
        Ok(true)
    }
}

/// Photo reference with the largest pixel area.
pub fn best_photo(photos: &[PhotoMeta]) -> Option<&str> {
    photos
        .iter()
        .max_by_key(|p| p.width * p.height)
        .and_then(|p| p.photo_reference.as_deref())
}
