//! Tamarack - reconciliation and enrichment pipeline for a place catalog.
//!
//! This library provides the shared modules used by the batch binaries:
//! asset deduplication, place record merging, and geodata enrichment.

pub mod assets;
pub mod config;
pub mod db;
pub mod geodata;
pub mod merge;
pub mod models;

pub use config::Config;
pub use models::{GeoConfidence, Place};
