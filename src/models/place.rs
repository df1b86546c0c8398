//! Place row structure and the fixed merge field set.

use sqlx::FromRow;

/// A point-of-interest row from the `places` table.
#[derive(Debug, Clone, Default, FromRow)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub price_level: Option<i64>,
    pub image_url: Option<String>,
    pub photo_url: Option<String>,
    pub maps_url: Option<String>,
    pub directions_url: Option<String>,
    pub geo_source: Option<String>,
    pub geo_confidence: Option<String>,
    pub geo_distance_km: Option<f64>,
}

/// Historical alias columns for "the place's photo", in resolution order.
///
/// `photo_url` was introduced by the enrichment pipeline; `image_url` is the
/// older seeded column. Both remain in use, so any "does this row have a
/// photo?" check must consult the full list.
pub const PHOTO_REF_ALIASES: [&str; 2] = ["photo_url", "image_url"];

impl Place {
    /// First non-empty photo reference among the alias columns.
    pub fn photo_ref(&self) -> Option<&str> {
        PHOTO_REF_ALIASES
            .iter()
            .find_map(|col| non_empty(self.alias_value(col)))
    }

    fn alias_value(&self, column: &str) -> Option<&str> {
        match column {
            "photo_url" => self.photo_url.as_deref(),
            "image_url" => self.image_url.as_deref(),
            _ => None,
        }
    }

    /// Stored coordinates, when both components are present.
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Provenance/trust marker on a place's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoConfidence {
    /// Coordinates came from the maps service and passed verification.
    Verified,
    /// Verification failed or never ran; stored coordinates are untouched.
    OriginalOrUnverified,
}

impl GeoConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoConfidence::Verified => "verified",
            GeoConfidence::OriginalOrUnverified => "original_or_unverified",
        }
    }
}

/// The fields the merge engine scores, backfills, and updates.
///
/// Order matters: it is the scan order for completeness scoring and donor
/// backfill, and must stay stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeField {
    Description,
    Address,
    Lat,
    Lon,
    PriceLevel,
    ImageUrl,
    MapsUrl,
}

pub const MERGE_FIELDS: [MergeField; 7] = [
    MergeField::Description,
    MergeField::Address,
    MergeField::Lat,
    MergeField::Lon,
    MergeField::PriceLevel,
    MergeField::ImageUrl,
    MergeField::MapsUrl,
];

/// A typed value for one merge field, used for scoring and UPDATE binding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Real(Option<f64>),
    Int(Option<i64>),
}

impl FieldValue {
    /// Empty means NULL, or text that is blank after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.as_deref().map_or(true, |s| s.trim().is_empty()),
            FieldValue::Real(v) => v.is_none(),
            FieldValue::Int(v) => v.is_none(),
        }
    }
}

impl MergeField {
    pub fn column(&self) -> &'static str {
        match self {
            MergeField::Description => "description",
            MergeField::Address => "address",
            MergeField::Lat => "lat",
            MergeField::Lon => "lon",
            MergeField::PriceLevel => "price_level",
            MergeField::ImageUrl => "image_url",
            MergeField::MapsUrl => "maps_url",
        }
    }

    pub fn get(&self, place: &Place) -> FieldValue {
        match self {
            MergeField::Description => FieldValue::Text(place.description.clone()),
            MergeField::Address => FieldValue::Text(place.address.clone()),
            MergeField::Lat => FieldValue::Real(place.lat),
            MergeField::Lon => FieldValue::Real(place.lon),
            MergeField::PriceLevel => FieldValue::Int(place.price_level),
            MergeField::ImageUrl => FieldValue::Text(place.image_url.clone()),
            MergeField::MapsUrl => FieldValue::Text(place.maps_url.clone()),
        }
    }
}
