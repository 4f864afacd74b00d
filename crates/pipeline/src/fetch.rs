//! Scene fetchers
//!
//! A [`SceneFetcher`] returns the requested bands and the SCL layer of one
//! scene, resampled onto a scene grid. [`CogFetcher`] reads band COGs from
//! object storage; [`HubFetcher`] renders them with the Sentinel Hub
//! Process API.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::try_join_all;
use s2cuts_algorithms::biophysical::AngleGeometry;
use s2cuts_algorithms::warp::warp_nearest;
use s2cuts_cloud::{CogReader, CogReaderOptions, HttpClient, ProcessClient, ProcessRequest};
use s2cuts_core::raster::{GridSpec, Raster};
use tracing::debug;

use crate::catalog::SceneCandidate;
use crate::error::{PipelineError, Result};
use crate::variable::S2Band;

/// What to fetch for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Reflectance bands; SCL is always fetched in addition.
    pub bands: Vec<S2Band>,
    pub grid: GridSpec,
    /// Whether sun/view angles are needed.
    pub geometry: bool,
}

/// Fetched rasters of one scene, all on the request grid.
#[derive(Debug, Clone)]
pub struct SceneData {
    pub bands: HashMap<S2Band, Raster<f32>>,
    pub scl: Raster<f32>,
    /// Angles observed by the fetcher, overriding catalog metadata.
    pub geometry: Option<AngleGeometry>,
}

impl SceneData {
    pub fn band(&self, band: S2Band) -> Option<&Raster<f32>> {
        self.bands.get(&band)
    }
}

/// Retrieves band imagery for a scene.
#[async_trait]
pub trait SceneFetcher: Send + Sync {
    async fn fetch(&self, scene: &SceneCandidate, request: &FetchRequest) -> Result<SceneData>;
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// Reads scene assets as remote COGs.
pub struct CogFetcher {
    client: HttpClient,
    options: CogReaderOptions,
}

impl CogFetcher {
    pub fn new(client: HttpClient, options: CogReaderOptions) -> Self {
        Self { client, options }
    }

    /// Read one band, warp it onto `grid` and convert to reflectance.
    async fn read_band(&self, scene: &SceneCandidate, band: S2Band, grid: &GridSpec) -> Result<Raster<f32>> {
        let asset = scene
            .assets
            .get(&band)
            .ok_or_else(|| PipelineError::scene(&scene.id, format!("no {band} asset")))?;

        let reader = CogReader::open_with_client(&asset.href, self.client.clone(), self.options.clone()).await?;
        let mut source = reader.read_covering(grid).await?;
        if source.nodata().map_or(true, f32::is_nan) {
            let nodata = asset.nodata.or(band.is_reflectance().then_some(0.0));
            if let Some(nodata) = nodata {
                source.set_nodata(Some(nodata as f32));
            }
        }

        let mut warped = warp_nearest(&source, grid)?;
        if band.is_reflectance() {
            let (scale, offset) = (asset.scale as f32, asset.offset as f32);
            warped.data_mut().mapv_inplace(|v| v * scale + offset);
        }
        debug!(scene = %scene.id, %band, href = %asset.href, "band read");
        Ok(warped)
    }
}

#[async_trait]
impl SceneFetcher for CogFetcher {
    async fn fetch(&self, scene: &SceneCandidate, request: &FetchRequest) -> Result<SceneData> {
        let wanted: Vec<S2Band> = request
            .bands
            .iter()
            .copied()
            .filter(|b| *b != S2Band::Scl)
            .chain(std::iter::once(S2Band::Scl))
            .collect();
        let rasters = try_join_all(wanted.iter().map(|band| self.read_band(scene, *band, &request.grid))).await?;

        let mut bands: HashMap<S2Band, Raster<f32>> = wanted.into_iter().zip(rasters).collect();
        let scl = bands
            .remove(&S2Band::Scl)
            .ok_or_else(|| PipelineError::scene(&scene.id, "SCL layer missing"))?;
        Ok(SceneData {
            bands,
            scl,
            geometry: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Sentinel Hub
// ---------------------------------------------------------------------------

/// Per-pixel angle bands of the Sentinel Hub `sentinel-2-l2a` collection,
/// in [`AngleGeometry`] field order.
pub const ANGLE_BANDS: [&str; 4] = ["sunZenithAngles", "sunAzimuthAngles", "viewZenithMean", "viewAzimuthMean"];

/// Renders scenes through the Process API.
pub struct HubFetcher {
    client: ProcessClient,
    max_cloud_coverage: f64,
}

impl HubFetcher {
    pub fn new(client: ProcessClient, max_cloud_coverage: f64) -> Self {
        Self {
            client,
            max_cloud_coverage,
        }
    }

    /// The Process API request for `scene`.
    pub fn process_request(&self, scene: &SceneCandidate, request: &FetchRequest) -> ProcessRequest {
        let mut names: Vec<String> = request
            .bands
            .iter()
            .filter(|b| **b != S2Band::Scl)
            .map(|b| b.name().to_string())
            .collect();
        if request.geometry {
            names.extend(ANGLE_BANDS.iter().map(|b| b.to_string()));
        }
        ProcessRequest::new(names, request.grid, scene.date, self.max_cloud_coverage)
    }
}

#[async_trait]
impl SceneFetcher for HubFetcher {
    async fn fetch(&self, scene: &SceneCandidate, request: &FetchRequest) -> Result<SceneData> {
        let process = self.process_request(scene, request);
        let rasters = self.client.render(&process).await?;
        split_hub_response(scene, request, rasters)
    }
}

/// Split rendered rasters (bands, then angles, then SCL) into [`SceneData`].
fn split_hub_response(scene: &SceneCandidate, request: &FetchRequest, mut rasters: Vec<Raster<f32>>) -> Result<SceneData> {
    let scl = rasters
        .pop()
        .ok_or_else(|| PipelineError::scene(&scene.id, "empty Process API response"))?;

    let band_list: Vec<S2Band> = request.bands.iter().copied().filter(|b| *b != S2Band::Scl).collect();
    let angles = if request.geometry {
        if rasters.len() < ANGLE_BANDS.len() {
            return Err(PipelineError::scene(&scene.id, "angle bands missing from response"));
        }
        rasters.split_off(rasters.len() - ANGLE_BANDS.len())
    } else {
        Vec::new()
    };
    if rasters.len() != band_list.len() {
        return Err(PipelineError::scene(
            &scene.id,
            format!("expected {} bands, got {}", band_list.len(), rasters.len()),
        ));
    }

    let geometry = match angles.as_slice() {
        [sz, sa, vz, va] => Some(AngleGeometry {
            sun_zenith: mean_angle(sz, false).ok_or_else(|| PipelineError::scene(&scene.id, "no valid sun angles"))?,
            sun_azimuth: mean_angle(sa, true).ok_or_else(|| PipelineError::scene(&scene.id, "no valid sun angles"))?,
            view_zenith: mean_angle(vz, false).unwrap_or(0.0),
            view_azimuth: mean_angle(va, true).unwrap_or(0.0),
        }),
        _ => None,
    };

    Ok(SceneData {
        bands: band_list.into_iter().zip(rasters).collect(),
        scl,
        geometry,
    })
}

/// Mean of the finite values of an angle raster in degrees, circular for
/// azimuths.
fn mean_angle(raster: &Raster<f32>, circular: bool) -> Option<f64> {
    let values: Vec<f64> = raster
        .data()
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| v as f64)
        .collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    if circular {
        let (s, c) = values
            .iter()
            .fold((0.0, 0.0), |(s, c), v| (s + v.to_radians().sin(), c + v.to_radians().cos()));
        Some((s / n).atan2(c / n).to_degrees().rem_euclid(360.0))
    } else {
        Some(values.iter().sum::<f64>() / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::candidate;
    use approx::assert_relative_eq;
    use s2cuts_cloud::process_api::SCL_BAND;
    use s2cuts_core::CRS;

    fn grid() -> GridSpec {
        GridSpec::from_bounds((600000.0, 5000000.0, 600200.0, 5000200.0), 20.0, CRS::from_epsg(32632)).unwrap()
    }

    fn filled(value: f32) -> Raster<f32> {
        let mut raster = Raster::from_grid(&grid(), value);
        raster.set_nodata(Some(f32::NAN));
        raster
    }

    #[test]
    fn test_process_request_bands() {
        let client = ProcessClient::new(
            HttpClient::new(std::time::Duration::from_secs(5), 0).unwrap(),
            "https://sh.example.com",
        );
        let fetcher = HubFetcher::new(client, 20.0);
        let request = FetchRequest {
            bands: vec![S2Band::B04, S2Band::B08],
            grid: grid(),
            geometry: true,
        };
        let process = fetcher.process_request(&candidate("s", 14, 3.0), &request);
        let outputs = process.output_bands();
        assert_eq!(outputs.len(), 7);
        assert_eq!(outputs[0], "B04");
        assert_eq!(outputs[2], ANGLE_BANDS[0]);
        assert_eq!(*outputs.last().unwrap(), SCL_BAND);
        assert_eq!(process.max_cloud_coverage, 20.0);
    }

    #[test]
    fn test_split_hub_response_with_angles() {
        let request = FetchRequest {
            bands: vec![S2Band::B04, S2Band::B08],
            grid: grid(),
            geometry: true,
        };
        let rasters = vec![
            filled(0.05),
            filled(0.4),
            filled(60.0),
            filled(350.0),
            filled(5.0),
            filled(100.0),
            filled(4.0),
        ];
        let data = split_hub_response(&candidate("s", 14, 3.0), &request, rasters).unwrap();
        assert_eq!(data.band(S2Band::B08).unwrap().data()[(0, 0)], 0.4);
        assert_eq!(data.scl.data()[(0, 0)], 4.0);
        let geometry = data.geometry.unwrap();
        assert_relative_eq!(geometry.sun_zenith, 60.0, epsilon = 1e-4);
        assert_relative_eq!(geometry.sun_azimuth, 350.0, epsilon = 1e-4);
        assert_relative_eq!(geometry.view_azimuth, 100.0, epsilon = 1e-4);
    }

    #[test]
    fn test_split_hub_response_band_count_mismatch() {
        let request = FetchRequest {
            bands: vec![S2Band::B04, S2Band::B08],
            grid: grid(),
            geometry: false,
        };
        let err = split_hub_response(&candidate("s", 14, 3.0), &request, vec![filled(0.1), filled(4.0)]).unwrap_err();
        assert!(!err.is_setup());
    }

    #[test]
    fn test_circular_mean_wraps() {
        let mut raster = filled(350.0);
        raster.data_mut()[(0, 0)] = 10.0;
        raster.data_mut()[(0, 1)] = f32::NAN;
        let mean = mean_angle(&raster, true).unwrap();
        assert!(mean > 340.0 && mean < 360.0, "{mean}");
    }
}
