//! External maps service: search, verification, and the enrichment pass.

pub mod client;
pub mod enrich;
pub mod verify;

pub use client::{best_photo, Candidate, MapsClient, PhotoMeta, PlaceDetails};
pub use enrich::{directions_url, enrich_all, slugify, EnrichStats};
pub use verify::{city_from_address, haversine_km, locality_matches, verify, Verdict, VerifyPolicy};
