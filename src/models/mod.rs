//! Core data models for the place catalog.

pub mod place;

pub use place::{FieldValue, GeoConfidence, MergeField, Place, MERGE_FIELDS, PHOTO_REF_ALIASES};
