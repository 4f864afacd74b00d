//! Area of interest loading and normalization
//!
//! An AOI is kept as a WGS84 (EPSG:4326) multipolygon. GeoJSON input may
//! carry a legacy `crs` member naming a projected CRS; coordinates are then
//! unprojected vertex by vertex.

use std::path::Path;

use geo::{BoundingRect, Centroid, Coord, MapCoords, MultiPolygon, Polygon, Rect};
use geojson::{feature::Id, Feature, GeoJson, JsonObject};
use s2cuts_core::crs::{Projection, CRS};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// Identifier used when the input names none.
pub const DEFAULT_AOI_ID: &str = "aoi";

/// A polygonal area of interest in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    id: String,
    geometry: MultiPolygon<f64>,
}

impl AreaOfInterest {
    /// Build an AOI from polygons expressed in `crs`.
    pub fn new(id: &str, geometry: MultiPolygon<f64>, crs: CRS) -> Result<Self> {
        if geometry.0.is_empty() || geometry.0.iter().all(|p| p.exterior().0.len() < 4) {
            return Err(PipelineError::Aoi("geometry has no polygon ring".into()));
        }
        let projection = crs
            .projection()
            .map_err(|_| PipelineError::Aoi(format!("unsupported AOI CRS {crs}")))?;

        let geometry = match projection {
            Projection::Geographic => geometry,
            _ => geometry.map_coords(|c| {
                let (lon, lat) = projection.inverse(c.x, c.y);
                Coord { x: lon, y: lat }
            }),
        };

        let in_range = geometry
            .0
            .iter()
            .flat_map(|p| p.exterior().coords())
            .all(|c| c.x.is_finite() && c.y.is_finite() && c.x.abs() <= 180.0 && c.y.abs() <= 90.0);
        if !in_range {
            return Err(PipelineError::Aoi(format!(
                "coordinates are not valid longitude/latitude after normalization from {crs}"
            )));
        }

        Ok(Self {
            id: sanitize_id(id),
            geometry,
        })
    }

    /// Rectangular AOI from `(min_x, min_y, max_x, max_y)` in `crs`.
    pub fn from_bbox(id: &str, bbox: (f64, f64, f64, f64), crs: CRS) -> Result<Self> {
        let (min_x, min_y, max_x, max_y) = bbox;
        if !(min_x < max_x && min_y < max_y) {
            return Err(PipelineError::Aoi(format!("degenerate bounding box {bbox:?}")));
        }
        let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        Self::new(id, MultiPolygon::new(vec![rect.to_polygon()]), crs)
    }

    /// Parse a GeoJSON document (Feature, FeatureCollection or bare
    /// Geometry).
    ///
    /// `select` picks a feature by its id or its `id` property. Without it
    /// the first feature is used.
    pub fn from_geojson_str(text: &str, select: Option<&str>) -> Result<Self> {
        let geojson: GeoJson = text.parse()?;
        match geojson {
            GeoJson::Geometry(geometry) => {
                let crs = declared_crs(geometry.foreign_members.as_ref())?;
                if let Some(id) = select {
                    return Err(PipelineError::Aoi(format!(
                        "cannot select '{id}' from a bare geometry"
                    )));
                }
                Self::new(DEFAULT_AOI_ID, to_polygons(geometry)?, crs)
            }
            GeoJson::Feature(feature) => {
                let crs = declared_crs(feature.foreign_members.as_ref())?;
                let id = feature_id(&feature);
                if let Some(wanted) = select {
                    if id.as_deref() != Some(wanted) {
                        return Err(PipelineError::Aoi(format!("no feature with id '{wanted}'")));
                    }
                }
                Self::from_feature(feature, id, crs)
            }
            GeoJson::FeatureCollection(collection) => {
                let crs = declared_crs(collection.foreign_members.as_ref())?;
                let mut features = collection.features.into_iter();
                let feature = match select {
                    Some(wanted) => features
                        .find(|f| feature_id(f).as_deref() == Some(wanted))
                        .ok_or_else(|| PipelineError::Aoi(format!("no feature with id '{wanted}'")))?,
                    None => features
                        .next()
                        .ok_or_else(|| PipelineError::Aoi("feature collection is empty".into()))?,
                };
                let id = feature_id(&feature);
                Self::from_feature(feature, id, crs)
            }
        }
    }

    /// Read and parse a GeoJSON file.
    pub fn from_file<P: AsRef<Path>>(path: P, select: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Aoi(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_geojson_str(&text, select)
    }

    fn from_feature(feature: Feature, id: Option<String>, crs: CRS) -> Result<Self> {
        let geometry = feature
            .geometry
            .ok_or_else(|| PipelineError::Aoi("feature has no geometry".into()))?;
        Self::new(id.as_deref().unwrap_or(DEFAULT_AOI_ID), to_polygons(geometry)?, crs)
    }

    /// Replace the identifier.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = sanitize_id(id);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Polygons in EPSG:4326.
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// `(west, south, east, north)` in degrees.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        match self.geometry.bounding_rect() {
            Some(r) => (r.min().x, r.min().y, r.max().x, r.max().y),
            None => (0.0, 0.0, 0.0, 0.0),
        }
    }

    /// `(lon, lat)` of the centroid.
    pub fn centroid(&self) -> (f64, f64) {
        match self.geometry.centroid() {
            Some(p) => (p.x(), p.y()),
            None => {
                let (w, s, e, n) = self.bbox();
                ((w + e) / 2.0, (s + n) / 2.0)
            }
        }
    }

    /// Polygons projected into `crs`.
    pub fn project(&self, crs: CRS) -> Result<MultiPolygon<f64>> {
        let projection = crs
            .projection()
            .map_err(|_| PipelineError::TargetCrs(crs.to_string()))?;
        Ok(self.geometry.map_coords(|c| {
            let (x, y) = projection.forward(c.x, c.y);
            Coord { x, y }
        }))
    }
}

fn to_polygons(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    collect_polygons(geometry, &mut polygons)?;
    Ok(MultiPolygon::new(polygons))
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
        geo::Geometry::Rect(r) => out.push(r.to_polygon()),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out)?;
            }
        }
        other => {
            return Err(PipelineError::Aoi(format!(
                "AOI geometry must be polygonal, got {}",
                geometry_kind(&other)
            )))
        }
    }
    Ok(())
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::Triangle(_) => "Triangle",
        _ => "polygon",
    }
}

/// Feature id, falling back to the `id` property. Numbers are rendered
/// without quotes.
fn feature_id(feature: &Feature) -> Option<String> {
    let from_member = feature.id.as_ref().map(|id| match id {
        Id::String(s) => s.clone(),
        Id::Number(n) => n.to_string(),
    });
    from_member.or_else(|| {
        feature
            .properties
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    })
}

/// CRS named by a legacy `"crs": {"type": "name", "properties": {"name": ..}}`
/// member, EPSG:4326 if absent.
fn declared_crs(members: Option<&JsonObject>) -> Result<CRS> {
    let name = members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str);
    match name {
        Some(name) => CRS::parse(name).map_err(|_| PipelineError::Aoi(format!("unrecognized crs member '{name}'"))),
        None => Ok(CRS::wgs84()),
    }
}

/// Keep ids usable as a path component.
fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_AOI_ID.to_string()
    } else {
        cleaned
    }
}
