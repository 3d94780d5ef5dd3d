//! Wire types for the geocoder response.
//!
//! Every level defaults to empty on missing fields: a structurally sparse
//! response flows into the "no match" outcome instead of a decode error.
//! Only a body that is not JSON at all is treated as fatal.

use serde::Deserialize;

/// A resolved position: what the rest of the service consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPosition {
    pub longitude: f64,
    pub latitude: f64,
    /// Canonical display name reported by the provider.
    pub outer_api_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeocodeResponse {
    #[serde(default)]
    pub response: ResponseBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseBody {
    #[serde(default, rename = "GeoObjectCollection")]
    pub geo_object_collection: GeoObjectCollection,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeoObjectCollection {
    #[serde(default, rename = "featureMember")]
    pub feature_member: Vec<FeatureMember>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FeatureMember {
    #[serde(default, rename = "GeoObject")]
    pub geo_object: GeoObject,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeoObject {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "metaDataProperty")]
    pub meta_data_property: MetaDataProperty,
    #[serde(default, rename = "Point")]
    pub point: Point,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MetaDataProperty {
    #[serde(default, rename = "GeocoderMetaData")]
    pub geocoder_meta_data: GeocoderMetaData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeocoderMetaData {
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Point {
    /// Whitespace-separated `"<longitude> <latitude>"`.
    #[serde(default)]
    pub pos: String,
}
