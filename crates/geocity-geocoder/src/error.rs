use thiserror::Error;

/// Errors returned by the geocoder client.
#[derive(Debug, Error)]
pub enum GeocoderError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The base URL from configuration could not be parsed.
    #[error("invalid geocoder base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The response body was not JSON of the expected envelope shape.
    #[error("JSON deserialization error for geocode('{context}'): {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
