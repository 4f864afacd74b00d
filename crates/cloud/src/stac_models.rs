//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Lightweight serde models for STAC Item Search (POST /search) responses,
//! covering what Sentinel-2 scene selection needs: bbox, datetime and
//! collection filtering, pagination via `links`, the EO / view / projection
//! extension properties and the `raster:bands` asset metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API – Item Search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Pagination cursor used by the Sentinel Hub catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set datetime or datetime range (e.g. `"2024-06-01T00:00:00Z/2024-06-30T23:59:59Z"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type", default = "feature_collection")]
    pub type_: String,

    #[serde(default)]
    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Sentinel Hub reports `context.next` instead of a `next` link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

fn feature_collection() -> String {
    "FeatureCollection".to_string()
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    /// Cursor from `context.next`, if present.
    pub fn context_next(&self) -> Option<&Value> {
        self.context
            .as_ref()
            .and_then(|c| c.get("next"))
            .filter(|v| !v.is_null())
    }

    pub fn has_next(&self) -> bool {
        self.next_link().is_some() || self.context_next().is_some()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Unique item identifier, e.g. `S2B_32TPR_20190114_0_L2A`.
    pub id: String,

    /// Geometry as raw JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// EPSG code from the projection extension (`proj:epsg`, or a
    /// `proj:code` of the form `EPSG:<n>`).
    pub fn epsg(&self) -> Option<u32> {
        let props = &self.properties.extra;
        props
            .get("proj:epsg")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or_else(|| {
                props
                    .get("proj:code")
                    .and_then(Value::as_str)
                    .and_then(|s| s.strip_prefix("EPSG:"))
                    .and_then(|s| s.parse().ok())
            })
    }

    /// Acquisition time from `properties.datetime` (RFC 3339, with or
    /// without fractional seconds).
    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.properties.datetime.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Cloud cover percentage (EO extension).
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }

    /// A numeric property from the extension namespace, e.g. `view:sun_azimuth`.
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        self.properties.extra.get(key).and_then(Value::as_f64)
    }

    /// Sentinel-2 MGRS tile (`s2:mgrs_tile`, else `grid:code`), e.g. `32TPR`.
    pub fn mgrs_tile(&self) -> Option<String> {
        let props = &self.properties.extra;
        props
            .get("s2:mgrs_tile")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                props
                    .get("grid:code")
                    .and_then(Value::as_str)
                    .and_then(|s| s.strip_prefix("MGRS-"))
                    .map(str::to_string)
            })
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Cloud cover percentage (EO extension).
    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    /// Platform name (e.g., "sentinel-2a").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    /// URL to the asset file.
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, `["overview"]`, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Per-band raster metadata (raster extension).
    #[serde(rename = "raster:bands", default, skip_serializing_if = "Vec::is_empty")]
    pub raster_bands: Vec<RasterBand>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl StacAsset {
    /// Radiometric scale of the first band.
    pub fn scale(&self) -> Option<f64> {
        self.raster_bands.first().and_then(|b| b.scale)
    }

    /// Radiometric offset of the first band.
    pub fn offset(&self) -> Option<f64> {
        self.raster_bands.first().and_then(|b| b.offset)
    }

    /// Declared nodata of the first band.
    pub fn nodata(&self) -> Option<f64> {
        self.raster_bands.first().and_then(|b| b.nodata)
    }

    /// Whether the asset is a (cloud-optimized) GeoTIFF.
    pub fn is_geotiff(&self) -> bool {
        let typed = self
            .type_
            .as_deref()
            .is_some_and(|t| t.contains("geotiff") || t.contains("geo+tiff"));
        typed || self.href.ends_with(".tif") || self.href.ends_with(".tiff")
    }
}

/// One entry of `raster:bands`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RasterBand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_resolution: Option<f64>,
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Merge mode: if true, merge body with previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "S2B_32TPR_20190114_0_L2A",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[10.3, 44.1], [11.7, 44.1], [11.7, 45.1], [10.3, 45.1], [10.3, 44.1]]]
      },
      "bbox": [10.3, 44.1, 11.7, 45.1],
      "properties": {
        "datetime": "2019-01-14T10:24:39.123000Z",
        "eo:cloud_cover": 5.2,
        "platform": "sentinel-2b",
        "proj:epsg": 32632,
        "s2:mgrs_tile": "32TPR",
        "view:sun_azimuth": 163.2,
        "view:sun_elevation": 22.5,
        "view:incidence_angle": 4.1
      },
      "assets": {
        "red": {
          "href": "https://sentinel-cogs.example.com/B04.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Red (band 4) - 10m",
          "roles": ["data", "reflectance"],
          "raster:bands": [{"nodata": 0, "data_type": "uint16", "scale": 0.0001, "offset": -0.1, "spatial_resolution": 10}]
        },
        "scl": {
          "href": "https://sentinel-cogs.example.com/SCL.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "roles": ["data"],
          "raster:bands": [{"nodata": 0, "data_type": "uint8", "spatial_resolution": 20}]
        },
        "thumbnail": {
          "href": "https://sentinel-cogs.example.com/thumb.jpg",
          "type": "image/jpeg",
          "roles": ["thumbnail"]
        }
      },
      "collection": "sentinel-2-l2a",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://earth-search.aws.element84.com/v1/search",
      "method": "POST",
      "body": {"token": "next:abc123"},
      "merge": true
    },
    {
      "rel": "self",
      "href": "https://earth-search.aws.element84.com/v1/search"
    }
  ],
  "numberMatched": 42,
  "numberReturned": 1
}"#;

    fn fixture() -> StacItemCollection {
        serde_json::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn parse_item_collection() {
        let col = fixture();
        assert_eq!(col.type_, "FeatureCollection");
        assert_eq!(col.len(), 1);
        assert_eq!(col.number_matched, Some(42));
        assert!(col.has_next());
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
    }

    #[test]
    fn item_accessors() {
        let col = fixture();
        let item = &col.features[0];
        assert_eq!(item.epsg(), Some(32632));
        assert_eq!(item.cloud_cover(), Some(5.2));
        assert_eq!(item.mgrs_tile().as_deref(), Some("32TPR"));
        assert_eq!(item.property_f64("view:sun_elevation"), Some(22.5));
        assert_eq!(item.property_f64("view:azimuth"), None);

        let t = item.acquired_at().unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2019, 1, 14));
        assert_eq!(t.hour(), 10);
    }

    #[test]
    fn datetime_without_fraction() {
        let mut item = fixture().features.remove(0);
        item.properties.datetime = Some("2019-01-14T10:24:39Z".into());
        assert!(item.acquired_at().is_some());
        item.properties.datetime = Some("14/01/2019".into());
        assert!(item.acquired_at().is_none());
    }

    #[test]
    fn raster_band_metadata() {
        let col = fixture();
        let item = &col.features[0];
        let red = item.asset("red").unwrap();
        assert_eq!(red.scale(), Some(0.0001));
        assert_eq!(red.offset(), Some(-0.1));
        assert_eq!(red.nodata(), Some(0.0));
        assert!(red.is_geotiff());

        let scl = item.asset("scl").unwrap();
        assert_eq!(scl.scale(), None);
        assert!(!item.asset("thumbnail").unwrap().is_geotiff());
    }

    #[test]
    fn proj_code_fallback() {
        let json = r#"{"id":"x","properties":{"datetime":null,"proj:code":"EPSG:32721"}}"#;
        let item: StacItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.epsg(), Some(32721));
        assert!(item.assets.is_empty());
    }

    #[test]
    fn context_next_cursor() {
        let json = r#"{"type":"FeatureCollection","features":[],"links":[],"context":{"next":10,"limit":10,"returned":10}}"#;
        let col: StacItemCollection = serde_json::from_str(json).unwrap();
        assert_eq!(col.context_next(), Some(&serde_json::json!(10)));
        assert!(col.has_next());

        let json = r#"{"type":"FeatureCollection","features":[],"context":{"limit":10,"returned":3}}"#;
        let col: StacItemCollection = serde_json::from_str(json).unwrap();
        assert!(!col.has_next());
    }

    #[test]
    fn builder_serializes_correctly() {
        let params = StacSearchParams::new()
            .bbox(10.9, 44.9, 11.0, 45.0)
            .datetime("2019-01-01T00:00:00Z/2019-02-01T23:59:59Z")
            .collections(&["sentinel-2-l2a"])
            .limit(100);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["bbox"], serde_json::json!([10.9, 44.9, 11.0, 45.0]));
        assert_eq!(json["collections"], serde_json::json!(["sentinel-2-l2a"]));
        assert_eq!(json["limit"], 100);
        assert!(json.get("token").is_none());
        assert!(json.get("next").is_none());
    }
}
