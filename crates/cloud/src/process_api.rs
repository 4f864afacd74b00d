//! Sentinel Hub Process API client.
//!
//! One request per scene: an evalscript returning the requested bands plus
//! SCL as FLOAT32, rendered on an explicit grid and decoded from the
//! multi-band TIFF response.

use chrono::{Duration as ChronoDuration, NaiveDate};
use s2cuts_core::io::read_bands_from_buffer;
use s2cuts_core::raster::{GridSpec, Raster};
use serde::Serialize;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::http::HttpClient;

/// Smallest response accepted for any request: a TIFF header and one IFD.
pub const MIN_RESPONSE_FLOOR: usize = 256;

/// A response must carry at least 1/`RESPONSE_COMPRESSION_ALLOWANCE` of the
/// raw FLOAT32 payload; emptier renders are treated as failed.
const RESPONSE_COMPRESSION_ALLOWANCE: usize = 100;

/// Band name of the scene classification layer in evalscripts.
pub const SCL_BAND: &str = "SCL";

/// Parameters for one Process API render.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Evalscript band names, e.g. `B04`, `B8A`. SCL is appended.
    pub bands: Vec<String>,
    /// Output grid (bbox, CRS and size).
    pub grid: GridSpec,
    /// Acquisition date; the request covers one day either side.
    pub date: NaiveDate,
    /// Maximum scene cloud coverage, percent.
    pub max_cloud_coverage: f64,
    /// Collection type, `sentinel-2-l2a` for CDSE.
    pub collection: String,
    /// Minimum accepted response size in bytes, derived from the grid and
    /// band count by [`ProcessRequest::new`].
    pub min_response_size: usize,
}

impl ProcessRequest {
    pub fn new(bands: Vec<String>, grid: GridSpec, date: NaiveDate, max_cloud_coverage: f64) -> Self {
        let mut request = Self {
            bands,
            grid,
            date,
            max_cloud_coverage,
            collection: "sentinel-2-l2a".to_string(),
            min_response_size: 0,
        };
        request.min_response_size = (request.payload_size() / RESPONSE_COMPRESSION_ALLOWANCE).max(MIN_RESPONSE_FLOOR);
        request
    }

    /// Uncompressed size of the rendered FLOAT32 bands in bytes.
    pub fn payload_size(&self) -> usize {
        self.grid.rows * self.grid.cols * self.output_bands().len() * std::mem::size_of::<f32>()
    }

    /// Every band in response order: the requested ones, then SCL.
    pub fn output_bands(&self) -> Vec<&str> {
        self.bands
            .iter()
            .map(String::as_str)
            .filter(|b| *b != SCL_BAND)
            .chain(std::iter::once(SCL_BAND))
            .collect()
    }

    /// Evalscript (version 3) returning `output_bands()` as FLOAT32.
    pub fn evalscript(&self) -> String {
        let bands = self.output_bands();
        let input = bands.iter().map(|b| format!("\"{}\"", b)).collect::<Vec<_>>().join(", ");
        let samples = bands.iter().map(|b| format!("sample.{}", b)).collect::<Vec<_>>().join(", ");
        format!(
            "//VERSION=3\n\
             function setup() {{\n  return {{\n    input: [{input}],\n    output: {{ bands: {n}, sampleType: \"FLOAT32\" }}\n  }};\n}}\n\n\
             function evaluatePixel(sample) {{\n  return [{samples}];\n}}\n",
            input = input,
            n = bands.len(),
            samples = samples,
        )
    }

    /// JSON request body.
    pub fn body(&self) -> ProcessBody {
        let (min_x, min_y, max_x, max_y) = self.grid.bounds();
        let from = self.date - ChronoDuration::days(1);
        let to = self.date + ChronoDuration::days(1);

        ProcessBody {
            input: ProcessInput {
                bounds: Bounds {
                    bbox: [min_x, min_y, max_x, max_y],
                    properties: BoundsProperties {
                        crs: format!("http://www.opengis.net/def/crs/EPSG/0/{}", self.grid.crs.epsg()),
                    },
                },
                data: vec![DataSource {
                    type_: self.collection.clone(),
                    data_filter: DataFilter {
                        time_range: TimeRange {
                            from: format!("{}T00:00:00Z", from.format("%Y-%m-%d")),
                            to: format!("{}T23:59:59Z", to.format("%Y-%m-%d")),
                        },
                        max_cloud_coverage: self.max_cloud_coverage,
                        mosaicking_order: "leastCC".to_string(),
                    },
                    processing: Processing {
                        upsampling: "NEAREST".to_string(),
                        downsampling: "NEAREST".to_string(),
                    },
                }],
            },
            output: ProcessOutput {
                width: self.grid.cols,
                height: self.grid.rows,
                responses: vec![OutputResponse {
                    identifier: "default".to_string(),
                    format: OutputFormat {
                        type_: "image/tiff".to_string(),
                    },
                }],
            },
            evalscript: self.evalscript(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessBody {
    pub input: ProcessInput,
    pub output: ProcessOutput,
    pub evalscript: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessInput {
    pub bounds: Bounds,
    pub data: Vec<DataSource>,
}

#[derive(Debug, Serialize)]
pub struct Bounds {
    pub bbox: [f64; 4],
    pub properties: BoundsProperties,
}

#[derive(Debug, Serialize)]
pub struct BoundsProperties {
    pub crs: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(rename = "type")]
    pub type_: String,
    pub data_filter: DataFilter,
    pub processing: Processing,
}

/// Resampling applied by the service. NEAREST keeps SCL classes intact.
#[derive(Debug, Serialize)]
pub struct Processing {
    pub upsampling: String,
    pub downsampling: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    pub time_range: TimeRange,
    pub max_cloud_coverage: f64,
    pub mosaicking_order: String,
}

#[derive(Debug, Serialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessOutput {
    pub width: usize,
    pub height: usize,
    pub responses: Vec<OutputResponse>,
}

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub identifier: String,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub type_: String,
}

/// Client for `POST {base}/api/v1/process`.
#[derive(Clone)]
pub struct ProcessClient {
    client: HttpClient,
    base_url: String,
}

impl ProcessClient {
    /// `client` must carry a bearer-token authenticator.
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn process_url(&self) -> String {
        format!("{}/api/v1/process", self.base_url.trim_end_matches('/'))
    }

    /// Render `request` and decode one raster per output band, in
    /// [`ProcessRequest::output_bands`] order, georeferenced on the
    /// request grid.
    pub async fn render(&self, request: &ProcessRequest) -> Result<Vec<Raster<f32>>> {
        let bytes = self
            .client
            .post_json_for_bytes(&self.process_url(), &request.body(), "image/tiff")
            .await?;
        debug!(size = bytes.len(), date = %request.date, "process API response");
        decode_response(&bytes, request)
    }
}

/// Validate and decode a Process API TIFF response.
pub fn decode_response(bytes: &[u8], request: &ProcessRequest) -> Result<Vec<Raster<f32>>> {
    if bytes.len() < request.min_response_size {
        return Err(CloudError::ResponseTooSmall {
            size: bytes.len(),
            min: request.min_response_size,
        });
    }

    let mut bands = read_bands_from_buffer::<f32>(bytes)?;
    let expected = request.output_bands().len();
    if bands.len() != expected {
        return Err(CloudError::InvalidTiff {
            reason: format!("expected {} bands, got {}", expected, bands.len()),
        });
    }

    let grid = &request.grid;
    for band in &mut bands {
        if band.shape() != (grid.rows, grid.cols) {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected {}x{} pixels, got {:?}", grid.cols, grid.rows, band.shape()),
            });
        }
        band.set_transform(grid.transform);
        band.set_crs(Some(grid.crs));
    }
    Ok(bands)
}
