//! HTTP client for the geocoding provider.
//!
//! Wraps `reqwest` with provider-specific response parsing and the relevance
//! policy for picking one candidate out of the provider's ordered match list.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::GeocoderError;
use crate::types::{GeoPosition, GeocodeResponse};

/// Candidate kinds the client accepts. Everything finer-grained (streets,
/// houses, metro stations) is deliberately ignored.
const ACCEPTED_KINDS: [&str; 2] = ["locality", "province"];

/// Settings for [`GeocoderClient`]; a slice of the application config.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl GeocoderConfig {
    #[must_use]
    pub fn from_app_config(config: &geocity_core::AppConfig) -> Self {
        Self {
            base_url: config.geocoder_base_url.clone(),
            api_key: config.geocoder_api_key.clone(),
            language: config.geocoder_language.clone(),
            timeout_secs: config.geocoder_timeout_secs,
        }
    }
}

/// Client for the geocoding provider.
///
/// Cheap to clone; use [`GeocoderClient::new`] for production or point
/// `base_url` at a mock server in tests.
#[derive(Debug, Clone)]
pub struct GeocoderClient {
    client: Client,
    api_key: String,
    language: String,
    base_url: Url,
}

impl GeocoderClient {
    /// Creates a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeocoderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GeocoderError::InvalidBaseUrl`] if the
    /// configured base URL does not parse.
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocoderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("geocity/0.1 (city-registry)")
            .build()?;

        let base_url =
            Url::parse(&config.base_url).map_err(|e| GeocoderError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            base_url,
        })
    }

    /// Resolves a free-text city name to its best-matching position.
    ///
    /// Issues one lookup request asking for locality-kind results, then picks
    /// the first candidate classified as `locality` or `province`. `Ok(None)`
    /// means the provider had no acceptable match: zero candidates, none of
    /// the accepted kinds, or an empty/unparseable position string.
    ///
    /// No caching and no retries; one outbound call per invocation.
    ///
    /// # Errors
    ///
    /// - [`GeocoderError::Http`] on connection failure or non-2xx status.
    /// - [`GeocoderError::Deserialize`] if the body is not JSON.
    pub async fn resolve(&self, city_name: &str) -> Result<Option<GeoPosition>, GeocoderError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("geocode", city_name),
                ("format", "json"),
                ("lang", self.language.as_str()),
                ("kind", "locality"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.json::<serde_json::Value>().await?;
        let parsed: GeocodeResponse =
            serde_json::from_value(body).map_err(|e| GeocoderError::Deserialize {
                context: city_name.to_owned(),
                source: e,
            })?;

        let members = parsed.response.geo_object_collection.feature_member;
        let Some(member) = members.into_iter().find(|m| {
            ACCEPTED_KINDS.contains(&m.geo_object.meta_data_property.geocoder_meta_data.kind.as_str())
        }) else {
            tracing::debug!(city_name, "geocoder returned no locality or province match");
            return Ok(None);
        };

        Ok(parse_position(&member.geo_object.point.pos).map(|(longitude, latitude)| {
            GeoPosition {
                longitude,
                latitude,
                outer_api_name: member.geo_object.name,
            }
        }))
    }
}

/// Parse the provider's `"<longitude> <latitude>"` position string.
///
/// Empty or malformed strings yield `None`; a missing position is a
/// no-match, not an error.
fn parse_position(pos: &str) -> Option<(f64, f64)> {
    let mut parts = pos.split_whitespace();
    let longitude = parts.next()?.parse::<f64>().ok()?;
    let latitude = parts.next()?.parse::<f64>().ok()?;
    Some((longitude, latitude))
}
