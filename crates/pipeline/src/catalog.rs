//! Scene catalog query and candidate selection
//!
//! Raw STAC items become [`SceneCandidate`]s, then [`select_candidates`]
//! collapses reprocessed duplicates, drops scenes above the cloud ceiling,
//! orders by acquisition date and numbers scenes within each date.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use s2cuts_algorithms::biophysical::AngleGeometry;
use s2cuts_cloud::auth::{ClientCredentials, CloudAuth};
use s2cuts_cloud::{StacClient, StacClientOptions, StacItem, StacSearchParams};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aoi::AreaOfInterest;
use crate::config::{DataSource, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::time_window::TimeWindow;
use crate::variable::S2Band;

/// Radiometric scale applied when an asset declares none.
pub const DEFAULT_REFLECTANCE_SCALE: f64 = 1e-4;

/// Remote band file of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandAsset {
    pub href: String,
    pub scale: f64,
    pub offset: f64,
    pub nodata: Option<f64>,
}

/// One scene returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCandidate {
    pub id: String,
    pub datetime: DateTime<Utc>,
    pub date: NaiveDate,
    /// Scene cloud cover, percent. Missing values are 100.
    pub cloud_cover: f64,
    /// Native projected CRS (`proj:epsg`).
    pub epsg: Option<u32>,
    /// MGRS tile, e.g. `32TPR`.
    pub tile: Option<String>,
    /// Position among the candidates sharing `date`, from 0.
    pub seq: u32,
    pub geometry: Option<AngleGeometry>,
    /// Band files, empty for the hub source.
    pub assets: HashMap<S2Band, BandAsset>,
}

impl SceneCandidate {
    /// Convert a STAC item. Items without a parseable datetime are skipped.
    pub fn from_stac_item(item: &StacItem) -> Option<Self> {
        let datetime = item.acquired_at()?;
        let assets = S2Band::ALL
            .iter()
            .filter_map(|band| {
                let asset = item
                    .asset(band.earth_search_asset())
                    .or_else(|| item.asset(band.name()))?;
                if !asset.is_geotiff() {
                    return None;
                }
                let scale = if band.is_reflectance() {
                    asset.scale().unwrap_or(DEFAULT_REFLECTANCE_SCALE)
                } else {
                    1.0
                };
                let offset = if band.is_reflectance() {
                    asset.offset().unwrap_or(0.0)
                } else {
                    0.0
                };
                Some((
                    *band,
                    BandAsset {
                        href: asset.href.clone(),
                        scale,
                        offset,
                        nodata: asset.nodata(),
                    },
                ))
            })
            .collect();

        Some(Self {
            id: item.id.clone(),
            datetime,
            date: datetime.date_naive(),
            cloud_cover: item.cloud_cover().unwrap_or(100.0),
            epsg: item.epsg(),
            tile: item.mgrs_tile(),
            seq: 0,
            geometry: item_geometry(item),
            assets,
        })
    }
}

/// Sun/view angles from the STAC `view` extension.
///
/// The sun is required; view angles default to nadir.
fn item_geometry(item: &StacItem) -> Option<AngleGeometry> {
    let sun_zenith = item
        .property_f64("view:sun_elevation")
        .map(|elevation| 90.0 - elevation)
        .or_else(|| item.property_f64("s2:mean_solar_zenith"))?;
    let sun_azimuth = item
        .property_f64("view:sun_azimuth")
        .or_else(|| item.property_f64("s2:mean_solar_azimuth"))?;
    Some(AngleGeometry {
        sun_zenith,
        sun_azimuth,
        view_zenith: item.property_f64("view:incidence_angle").unwrap_or(0.0),
        view_azimuth: item.property_f64("view:azimuth").unwrap_or(0.0),
    })
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Granule key and processing index of a scene id.
///
/// Ids are split on `_`; `parts[0..3]` plus the last part name the granule
/// and the digits of `parts[3]` give the processing index. Ids with fewer
/// than five parts are their own key with index 0.
pub fn granule_key(id: &str) -> (String, u64) {
    let parts: Vec<&str> = id.split('_').collect();
    if parts.len() < 5 {
        return (id.to_string(), 0);
    }
    let key = format!("{}_{}", parts[..3].join("_"), parts[parts.len() - 1]);
    let digits: String = parts[3].chars().filter(char::is_ascii_digit).collect();
    (key, digits.parse().unwrap_or(0))
}

/// Keep only the highest processing index of each granule, at the position
/// of the granule's first occurrence.
pub fn dedup_reprocessed(candidates: Vec<SceneCandidate>) -> Vec<SceneCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (u64, SceneCandidate)> = HashMap::new();
    for candidate in candidates {
        let (key, index) = granule_key(&candidate.id);
        match best.get(&key) {
            Some((kept, _)) if *kept >= index => {
                debug!(scene = %candidate.id, "dropping superseded reprocessing");
            }
            Some(_) => {
                best.insert(key, (index, candidate));
            }
            None => {
                order.push(key.clone());
                best.insert(key, (index, candidate));
            }
        }
    }
    order
        .into_iter()
        .filter_map(|key| best.remove(&key).map(|(_, c)| c))
        .collect()
}

/// Candidates at or below `ceiling` percent cloud cover, order preserved.
pub fn filter_by_cloud(candidates: Vec<SceneCandidate>, ceiling: f64) -> Vec<SceneCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.cloud_cover <= ceiling)
        .collect()
}

/// Stable ascending sort on acquisition date.
pub fn sort_by_date(candidates: &mut [SceneCandidate]) {
    candidates.sort_by_key(|c| c.date);
}

/// Number candidates within each date. Expects date-sorted input.
pub fn assign_seq(candidates: &mut [SceneCandidate]) {
    let mut previous: Option<NaiveDate> = None;
    let mut seq = 0;
    for candidate in candidates.iter_mut() {
        seq = if previous == Some(candidate.date) { seq + 1 } else { 0 };
        candidate.seq = seq;
        previous = Some(candidate.date);
    }
}

/// Merge candidates sharing a date into one, as the hub mosaics a date
/// itself. The merged scene keeps the lowest cloud cover, the earliest
/// datetime and a name joined from the distinct id components.
pub fn collapse_by_date(candidates: Vec<SceneCandidate>) -> Vec<SceneCandidate> {
    let mut groups: Vec<Vec<SceneCandidate>> = Vec::new();
    for candidate in candidates {
        match groups.iter_mut().find(|g| g[0].date == candidate.date) {
            Some(group) => group.push(candidate),
            None => groups.push(vec![candidate]),
        }
    }

    groups
        .into_iter()
        .filter_map(|group| {
            let ids: Vec<&str> = group.iter().map(|c| c.id.as_str()).collect();
            let name = merged_name(&ids);
            let cloud_cover = group.iter().map(|c| c.cloud_cover).fold(f64::INFINITY, f64::min);
            let datetime = group.iter().map(|c| c.datetime).min()?;
            let mut merged = group.into_iter().next()?;
            merged.id = name;
            merged.cloud_cover = cloud_cover;
            merged.datetime = datetime;
            Some(merged)
        })
        .collect()
}

/// Join the distinct values of the first five `_`/`.` separated components
/// of each id (satellite, level, datetime, baseline, orbit).
fn merged_name(ids: &[&str]) -> String {
    if ids.len() == 1 {
        return ids[0].to_string();
    }
    let split: Vec<Vec<&str>> = ids.iter().map(|id| id.split(['_', '.']).collect()).collect();
    (0..5)
        .map(|i| {
            split
                .iter()
                .filter_map(|parts| parts.get(i).copied())
                .collect::<BTreeSet<&str>>()
                .into_iter()
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Full selection: dedup, cloud filter, optional per-date collapse, date
/// sort and sequence numbering.
pub fn select_candidates(candidates: Vec<SceneCandidate>, ceiling: f64, collapse_dates: bool) -> Vec<SceneCandidate> {
    let mut selected = filter_by_cloud(dedup_reprocessed(candidates), ceiling);
    sort_by_date(&mut selected);
    if collapse_dates {
        selected = collapse_by_date(selected);
    }
    assign_seq(&mut selected);
    selected
}

// ---------------------------------------------------------------------------
// Catalog trait and STAC implementation
// ---------------------------------------------------------------------------

/// Source of candidate scenes.
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    /// Date-ordered candidates intersecting `aoi` within `window`, already
    /// filtered and numbered. Empty results are not an error.
    async fn search(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> Result<Vec<SceneCandidate>>;
}

/// [`SceneCatalog`] over a STAC Item Search endpoint.
pub struct StacSceneCatalog {
    client: StacClient,
    cloud_ceiling: f64,
    collapse_dates: bool,
}

impl StacSceneCatalog {
    pub fn new(client: StacClient, cloud_ceiling: f64, collapse_dates: bool) -> Self {
        Self {
            client,
            cloud_ceiling,
            collapse_dates,
        }
    }

    /// Catalog for `config.source`, authenticated with `auth` when the
    /// source needs it.
    pub fn from_config(config: &PipelineConfig, auth: Option<Arc<dyn CloudAuth>>) -> Result<Self> {
        let catalog = config.source.catalog(&config.hub_base_url);
        let options = StacClientOptions {
            request_timeout: config.request_timeout,
            max_retries: config.max_retries,
            max_items: config.max_items,
            ..Default::default()
        };
        let client = match auth {
            Some(auth) => StacClient::with_auth(catalog, options, auth),
            None => StacClient::new(catalog, options),
        }
        .map_err(PipelineError::Catalog)?;
        Ok(Self::new(
            client,
            config.cloud_ceiling,
            config.source == DataSource::Hub,
        ))
    }
}

#[async_trait]
impl SceneCatalog for StacSceneCatalog {
    async fn search(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> Result<Vec<SceneCandidate>> {
        let (west, south, east, north) = aoi.bbox();
        let collection = self.client.catalog().l2a_collection();
        let params = StacSearchParams::new()
            .bbox(west, south, east, north)
            .datetime(&window.stac_interval())
            .collections(&[collection]);

        let items = self.client.search_all(&params).await.map_err(PipelineError::Catalog)?;
        let total = items.len();
        let candidates: Vec<SceneCandidate> = items
            .iter()
            .filter_map(|item| {
                let candidate = SceneCandidate::from_stac_item(item);
                if candidate.is_none() {
                    warn!(item = %item.id, "skipping STAC item without datetime");
                }
                candidate
            })
            .collect();

        let selected = select_candidates(candidates, self.cloud_ceiling, self.collapse_dates);
        info!(
            aoi = aoi.id(),
            items = total,
            selected = selected.len(),
            ceiling = self.cloud_ceiling,
            "catalog query complete"
        );
        Ok(selected)
    }
}

/// OAuth credentials for `config`, if its source needs them.
pub fn auth_for(config: &PipelineConfig) -> Result<Option<Arc<dyn CloudAuth>>> {
    if !config.source.needs_credentials() {
        return Ok(None);
    }
    let creds = config
        .credentials
        .as_ref()
        .ok_or_else(|| PipelineError::Config("the hub source needs a client id and client secret".into()))?;
    let auth = ClientCredentials::new(&creds.client_id, &creds.client_secret).map_err(PipelineError::Catalog)?;
    Ok(Some(Arc::new(auth)))
}
