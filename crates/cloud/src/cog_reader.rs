//! Core COG reader: open remote COGs and read pixel windows or the window
//! covering a target grid.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use ndarray::Array2;
use s2cuts_core::crs::{transform_bounds, CRS};
use s2cuts_core::raster::{GeoTransform, GridSpec, Raster};
use tracing::debug;

use crate::decompress;
use crate::error::{CloudError, Result};
use crate::geotiff_keys::{self, GeoTiffMeta, TagValues};
use crate::http::HttpClient;
use crate::ifd::{self, tags, IfdInfo, RawIfd, TiffByteOrder};
use crate::tile_index::{self, PixelWindow};

/// Bytes fetched up front; usually covers the header, every IFD and the
/// GeoTIFF tags of a COG.
const INITIAL_FETCH: u64 = 64 * 1024;

/// Options for configuring a [`CogReader`].
#[derive(Debug, Clone)]
pub struct CogReaderOptions {
    /// Maximum number of concurrent tile fetches (default: 8).
    pub max_concurrent_fetches: usize,
    /// Per-request timeout (default: 30 s).
    pub request_timeout: Duration,
    /// Retries for transient HTTP failures (default: 3).
    pub max_retries: u32,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Summary of an opened COG.
#[derive(Debug, Clone)]
pub struct CogMetadata {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub geo_transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    pub num_overviews: usize,
}

/// A remote Cloud-Optimized GeoTIFF read through HTTP Range requests.
pub struct CogReader {
    url: String,
    client: HttpClient,
    byte_order: TiffByteOrder,
    ifds: Vec<IfdInfo>,
    geo_meta: GeoTiffMeta,
    options: CogReaderOptions,
}

impl CogReader {
    /// Open a public COG by URL.
    pub async fn open(url: &str, options: CogReaderOptions) -> Result<Self> {
        let client = HttpClient::new(options.request_timeout, options.max_retries)?;
        Self::open_with_client(url, client, options).await
    }

    /// Open a COG through an existing (possibly authenticated) client.
    ///
    /// Reads the TIFF header and the whole IFD chain (full resolution and
    /// overviews), fetching beyond the initial block only when needed.
    pub async fn open_with_client(url: &str, client: HttpClient, options: CogReaderOptions) -> Result<Self> {
        let head = client.fetch_range(url, 0, INITIAL_FETCH).await?;
        let source = RangeSource {
            client: &client,
            url,
            head: &head,
        };

        let header = ifd::parse_header(&head)?;
        let byte_order = header.byte_order;

        let mut ifds = Vec::new();
        let mut first_raw: Option<RawIfd> = None;
        let mut offset = header.first_ifd_offset as u64;
        while offset > 0 {
            let count = source.read(offset, 2).await?;
            let len = ifd::ifd_len(byte_order, &count).ok_or_else(|| CloudError::InvalidTiff {
                reason: format!("truncated IFD at offset {}", offset),
            })?;
            let raw = ifd::parse_ifd(byte_order, &source.read(offset, len as u64).await?)?;

            let values = source.resolve(byte_order, &raw, &tags::STRUCTURE).await?;
            ifds.push(ifd_info(byte_order, &raw, &values)?);

            offset = raw.next_ifd_offset as u64;
            if first_raw.is_none() {
                first_raw = Some(raw);
            }
        }

        let first_raw = first_raw.ok_or(CloudError::NoIfd)?;
        let geo_values = source.resolve(byte_order, &first_raw, &tags::GEO).await?;
        let geo_meta = geotiff_keys::extract_geotiff_meta(byte_order, &first_raw, &geo_values);

        debug!(
            url,
            width = ifds[0].width,
            height = ifds[0].height,
            overviews = ifds.len() - 1,
            crs = ?geo_meta.crs,
            "opened COG"
        );

        Ok(Self {
            url: url.to_string(),
            client,
            byte_order,
            ifds,
            geo_meta,
            options,
        })
    }

    pub fn metadata(&self) -> CogMetadata {
        let ifd = &self.ifds[0];
        CogMetadata {
            url: self.url.clone(),
            width: ifd.width,
            height: ifd.height,
            tile_width: ifd.tile_width,
            tile_height: ifd.tile_height,
            bits_per_sample: ifd.bits_per_sample,
            sample_format: ifd.sample_format,
            compression: ifd.compression,
            geo_transform: self.geo_meta.geo_transform,
            crs: self.geo_meta.crs,
            nodata: self.geo_meta.nodata,
            num_overviews: self.ifds.len().saturating_sub(1),
        }
    }

    /// Geotransform of IFD `level` (0 = full resolution).
    pub fn geo_transform_for(&self, level: usize) -> GeoTransform {
        let full = &self.ifds[0];
        match self.ifds.get(level) {
            Some(ovr) if level > 0 && ovr.width > 0 => {
                self.geo_meta.geo_transform.scaled(full.width as f64 / ovr.width as f64)
            }
            _ => self.geo_meta.geo_transform,
        }
    }

    /// Read the first band of a pixel window of IFD `level`.
    ///
    /// Tiles that are absent from the file (byte count 0) read as nodata,
    /// or NaN when the file declares none.
    pub async fn read_window(&self, level: usize, window: PixelWindow) -> Result<Raster<f32>> {
        let ifd = self.ifds.get(level).ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("IFD index {} out of range (have {})", level, self.ifds.len()),
        })?;
        if ifd.samples_per_pixel > 1 && ifd.planar_config != 1 {
            return Err(CloudError::UnsupportedPlanarConfig(ifd.planar_config));
        }
        if window.end_col() > ifd.width as usize || window.end_row() > ifd.height as usize {
            return Err(CloudError::WindowOutside);
        }

        let fill = self.geo_meta.nodata.map(|v| v as f32).unwrap_or(f32::NAN);
        let mut output = Array2::<f32>::from_elem((window.rows, window.cols), fill);

        let requests: Vec<_> = tile_index::tiles_for_window(&window, ifd.width, ifd.height, ifd.tile_width, ifd.tile_height)
            .into_iter()
            .filter_map(|t| {
                let offset = *ifd.tile_offsets.get(t.tile_idx)?;
                let length = *ifd.tile_byte_counts.get(t.tile_idx)?;
                (length > 0).then_some((t, offset, length))
            })
            .collect();

        let tiles: Vec<_> = stream::iter(requests)
            .map(|(t, offset, length)| async move {
                let bytes = self.client.fetch_range(&self.url, offset, length).await?;
                let raw = decompress::decompress_tile(&bytes, ifd.compression, ifd.raw_tile_size())?;
                let samples = decompress::decode_samples(&raw, ifd, self.byte_order)?;
                Ok::<_, CloudError>((t, samples))
            })
            .buffer_unordered(self.options.max_concurrent_fetches.max(1))
            .try_collect()
            .await?;

        let tw = ifd.tile_width as usize;
        let th = ifd.tile_height as usize;
        let spp = ifd.samples_per_pixel.max(1) as usize;
        for (t, samples) in &tiles {
            let tile_col0 = t.tile_col * tw;
            let tile_row0 = t.tile_row * th;
            let rows = tile_row0.max(window.row_off)..(tile_row0 + th).min(window.end_row());
            let cols = tile_col0.max(window.col_off)..(tile_col0 + tw).min(window.end_col());
            for img_row in rows {
                for img_col in cols.clone() {
                    let i = ((img_row - tile_row0) * tw + (img_col - tile_col0)) * spp;
                    if let Some(&v) = samples.get(i) {
                        output[(img_row - window.row_off, img_col - window.col_off)] = v;
                    }
                }
            }
        }

        let mut raster = Raster::from_array(output);
        raster.set_transform(self.geo_transform_for(level).window(window.col_off, window.row_off));
        raster.set_crs(self.geo_meta.crs);
        raster.set_nodata(Some(fill));
        Ok(raster)
    }

    /// Read the window of the file's own grid that covers `grid`, from the
    /// coarsest overview still at least as fine as the target resolution.
    ///
    /// The result stays in the file's CRS; one pixel of padding is kept so
    /// nearest-neighbour resampling has no gaps at the edges.
    pub async fn read_covering(&self, grid: &GridSpec) -> Result<Raster<f32>> {
        let src_crs = self.geo_meta.crs.ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("{} has no CRS", self.url),
        })?;
        let src_proj = src_crs.projection()?;
        let dst_proj = grid.crs.projection()?;

        let bounds = transform_bounds(&dst_proj, &src_proj, grid.bounds());
        let target_resolution = ((bounds.2 - bounds.0) / grid.cols as f64).min((bounds.3 - bounds.1) / grid.rows as f64);
        let widths: Vec<u32> = self.ifds.iter().map(|i| i.width).collect();
        let level = tile_index::select_overview(&widths, self.geo_meta.geo_transform.cell_size(), target_resolution);

        let ifd = &self.ifds[level];
        let window = PixelWindow::from_bounds(bounds, &self.geo_transform_for(level), ifd.width, ifd.height, 1)
            .ok_or(CloudError::WindowOutside)?;

        debug!(url = %self.url, level, ?window, "reading window");
        self.read_window(level, window).await
    }
}

/// Parse the structural tags of one IFD.
fn ifd_info(byte_order: TiffByteOrder, raw: &RawIfd, values: &TagValues) -> Result<IfdInfo> {
    let all = |tag: u16| -> Vec<u64> {
        match (raw.entry(tag), values.get(&tag)) {
            (Some(entry), Some(data)) => ifd::decode_u64s(byte_order, entry, data),
            _ => Vec::new(),
        }
    };
    let first = |tag: u16| all(tag).first().copied();

    let width = first(tags::IMAGE_WIDTH).unwrap_or(0) as u32;
    let height = first(tags::IMAGE_LENGTH).unwrap_or(0) as u32;
    let tile_width = first(tags::TILE_WIDTH).ok_or_else(|| CloudError::InvalidTiff {
        reason: "not tiled (no TileWidth tag)".into(),
    })? as u32;

    Ok(IfdInfo {
        width,
        height,
        tile_width,
        tile_height: first(tags::TILE_LENGTH).unwrap_or(tile_width as u64) as u32,
        tile_offsets: all(tags::TILE_OFFSETS),
        tile_byte_counts: all(tags::TILE_BYTE_COUNTS),
        bits_per_sample: first(tags::BITS_PER_SAMPLE).unwrap_or(8) as u16,
        sample_format: first(tags::SAMPLE_FORMAT).unwrap_or(1) as u16,
        compression: first(tags::COMPRESSION).unwrap_or(1) as u16,
        predictor: first(tags::PREDICTOR).unwrap_or(1) as u16,
        samples_per_pixel: first(tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16,
        planar_config: first(tags::PLANAR_CONFIG).unwrap_or(1) as u16,
    })
}

/// Byte source backed by the initial block, falling back to Range requests.
struct RangeSource<'a> {
    client: &'a HttpClient,
    url: &'a str,
    head: &'a [u8],
}

impl RangeSource<'_> {
    async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = (offset + len) as usize;
        if end <= self.head.len() {
            return Ok(self.head[offset as usize..end].to_vec());
        }
        self.client.fetch_range(self.url, offset, len).await
    }

    /// Collect the value bytes of `wanted` tags present in `raw`.
    async fn resolve(&self, byte_order: TiffByteOrder, raw: &RawIfd, wanted: &[u16]) -> Result<TagValues> {
        let mut values = TagValues::new();
        for entry in raw.entries.iter().filter(|e| wanted.contains(&e.tag)) {
            let data = if entry.is_inline() {
                entry.value_bytes.to_vec()
            } else {
                self.read(entry.offset(byte_order), entry.byte_len()).await?
            };
            values.insert(entry.tag, data);
        }
        Ok(values)
    }
}
