//! Client for the Yandex-style geocoding HTTP API.
//!
//! Translates a free-text city name into a single best-matching
//! `(longitude, latitude, canonical name)` triple, preferring locality- and
//! province-level matches over finer-grained results.

mod client;
mod error;
mod types;

pub use client::{GeocoderClient, GeocoderConfig};
pub use error::GeocoderError;
pub use types::GeoPosition;
