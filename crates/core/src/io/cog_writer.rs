//! Cloud-Optimized GeoTIFF writer
//!
//! Writes a single-band float32 little-endian TIFF with square internal
//! tiles, zlib/DEFLATE compression and nearest-neighbour overviews. All IFDs
//! are written right after the header so readers can discover every level
//! with a single range request; tile data follows, smallest overview first.

use super::geokeys::encode_geokeys;
use crate::error::{Error, Result};
use crate::raster::Raster;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::Path;

// ── TIFF tags / field types ──────────────────────────────────────────────

const NEW_SUBFILE_TYPE: u16 = 254;
const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const SAMPLES_PER_PIXEL: u16 = 277;
const PLANAR_CONFIGURATION: u16 = 284;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const TILE_BYTE_COUNTS: u16 = 325;
const SAMPLE_FORMAT: u16 = 339;
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_DOUBLE: u16 = 12;

const COMPRESSION_DEFLATE: u16 = 8;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

/// Options for COG output
#[derive(Debug, Clone)]
pub struct CogWriteOptions {
    /// Internal tile edge in pixels (multiple of 16)
    pub tile_size: u32,
    /// zlib level 0-9
    pub compression_level: u32,
    /// Build reduced-resolution levels until the image fits one tile
    pub overviews: bool,
    /// Value written for cells that are no-data (and tile padding)
    pub nodata: f32,
}

impl Default for CogWriteOptions {
    fn default() -> Self {
        Self {
            tile_size: 512,
            compression_level: 6,
            overviews: true,
            nodata: -9999.0,
        }
    }
}

/// Write `raster` as a COG at `path`.
pub fn write_cog<P: AsRef<Path>>(raster: &Raster<f32>, path: P, options: &CogWriteOptions) -> Result<()> {
    let bytes = write_cog_to_buffer(raster, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Encode `raster` as an in-memory COG.
pub fn write_cog_to_buffer(raster: &Raster<f32>, options: &CogWriteOptions) -> Result<Vec<u8>> {
    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    if options.tile_size == 0 || options.tile_size % 16 != 0 {
        return Err(Error::InvalidParameter {
            name: "tile_size",
            value: options.tile_size.to_string(),
            reason: "must be a positive multiple of 16".into(),
        });
    }
    let crs = raster.crs().ok_or_else(|| Error::UnsupportedCrs("raster has no CRS".into()))?;
    let geokeys = encode_geokeys(crs).ok_or_else(|| Error::UnsupportedCrs(crs.to_string()))?;

    // Cells that are no-data under the raster's own convention become the output sentinel.
    let base: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| if raster.is_nodata(v) { options.nodata } else { v })
        .collect();

    let mut levels = vec![Level::encode(base, cols, rows, options)?];
    while options.overviews {
        let last = &levels[levels.len() - 1];
        if last.width <= options.tile_size as usize && last.height <= options.tile_size as usize {
            break;
        }
        let (data, w, h) = decimate(&last.pixels, last.width, last.height);
        levels.push(Level::encode(data, w, h, options)?);
    }

    let gt = raster.transform();
    let nodata_text = format!("{}\0", options.nodata);

    let mut ifds: Vec<Ifd> = levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let mut ifd = Ifd::default();
            ifd.long(NEW_SUBFILE_TYPE, &[u32::from(i > 0)]);
            ifd.long(IMAGE_WIDTH, &[level.width as u32]);
            ifd.long(IMAGE_LENGTH, &[level.height as u32]);
            ifd.short(BITS_PER_SAMPLE, &[32]);
            ifd.short(COMPRESSION, &[COMPRESSION_DEFLATE]);
            ifd.short(PHOTOMETRIC, &[1]);
            ifd.short(SAMPLES_PER_PIXEL, &[1]);
            ifd.short(PLANAR_CONFIGURATION, &[1]);
            ifd.long(TILE_WIDTH, &[options.tile_size]);
            ifd.long(TILE_LENGTH, &[options.tile_size]);
            ifd.long(TILE_OFFSETS, &vec![0; level.tiles.len()]);
            ifd.long(
                TILE_BYTE_COUNTS,
                &level.tiles.iter().map(|t| t.len() as u32).collect::<Vec<_>>(),
            );
            ifd.short(SAMPLE_FORMAT, &[SAMPLE_FORMAT_FLOAT]);
            if i == 0 {
                ifd.double(MODEL_PIXEL_SCALE, &[gt.pixel_width, gt.pixel_height.abs(), 0.0]);
                ifd.double(MODEL_TIEPOINT, &[0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0]);
                ifd.short(GEO_KEY_DIRECTORY, &geokeys);
            }
            ifd.ascii(GDAL_NODATA, &nodata_text);
            ifd
        })
        .collect();

    // Layout: header | IFD 0 .. IFD n | tiles of level n .. tiles of level 0
    let mut ifd_offsets = Vec::with_capacity(ifds.len());
    let mut cursor = 8u64;
    for ifd in &ifds {
        ifd_offsets.push(cursor);
        cursor += ifd.encoded_len() as u64;
    }

    for (level, ifd) in levels.iter().zip(ifds.iter_mut()).rev() {
        let mut offsets = Vec::with_capacity(level.tiles.len());
        for tile in &level.tiles {
            offsets.push(u32::try_from(cursor).map_err(|_| too_large())?);
            cursor += tile.len() as u64;
        }
        ifd.long(TILE_OFFSETS, &offsets);
    }
    u32::try_from(cursor).map_err(|_| too_large())?;

    let mut out = Vec::with_capacity(cursor as usize);
    out.extend_from_slice(b"II");
    out.write_u16::<LittleEndian>(42)?;
    out.write_u32::<LittleEndian>(8)?;

    for (i, ifd) in ifds.iter().enumerate() {
        let next = ifd_offsets.get(i + 1).copied().unwrap_or(0);
        ifd.write(&mut out, ifd_offsets[i] as u32, next as u32)?;
    }
    for level in levels.iter().rev() {
        for tile in &level.tiles {
            out.extend_from_slice(tile);
        }
    }

    Ok(out)
}

fn too_large() -> Error {
    Error::Other("COG exceeds 4 GiB; BigTIFF output is not supported".into())
}

/// One resolution level: its pixels (for further decimation) and encoded tiles
struct Level {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
    tiles: Vec<Vec<u8>>,
}

impl Level {
    fn encode(pixels: Vec<f32>, width: usize, height: usize, options: &CogWriteOptions) -> Result<Self> {
        let ts = options.tile_size as usize;
        let tiles_across = width.div_ceil(ts);
        let tiles_down = height.div_ceil(ts);
        let mut tiles = Vec::with_capacity(tiles_across * tiles_down);

        let mut raw = Vec::with_capacity(ts * ts * 4);
        for ty in 0..tiles_down {
            for tx in 0..tiles_across {
                raw.clear();
                for r in 0..ts {
                    let row = ty * ts + r;
                    for c in 0..ts {
                        let col = tx * ts + c;
                        let v = if row < height && col < width {
                            pixels[row * width + col]
                        } else {
                            options.nodata
                        };
                        raw.write_f32::<LittleEndian>(v)?;
                    }
                }
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(options.compression_level));
                enc.write_all(&raw)?;
                tiles.push(enc.finish()?);
            }
        }

        Ok(Self {
            width,
            height,
            pixels,
            tiles,
        })
    }
}

/// Nearest-neighbour 2x reduction
fn decimate(pixels: &[f32], width: usize, height: usize) -> (Vec<f32>, usize, usize) {
    let w = width.div_ceil(2);
    let h = height.div_ceil(2);
    let mut out = Vec::with_capacity(w * h);
    for r in 0..h {
        for c in 0..w {
            out.push(pixels[(r * 2) * width + c * 2]);
        }
    }
    (out, w, h)
}

// ── IFD encoding ─────────────────────────────────────────────────────────

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    bytes: Vec<u8>,
}

/// Entries kept sorted by tag; values over 4 bytes go right after the IFD.
#[derive(Default)]
struct Ifd {
    entries: Vec<Entry>,
}

impl Ifd {
    fn set(&mut self, tag: u16, field_type: u16, count: u32, bytes: Vec<u8>) {
        let entry = Entry {
            tag,
            field_type,
            count,
            bytes,
        };
        match self.entries.binary_search_by_key(&tag, |e| e.tag) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    fn short(&mut self, tag: u16, values: &[u16]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.set(tag, TYPE_SHORT, values.len() as u32, bytes);
    }

    fn long(&mut self, tag: u16, values: &[u32]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.set(tag, TYPE_LONG, values.len() as u32, bytes);
    }

    fn double(&mut self, tag: u16, values: &[f64]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.set(tag, TYPE_DOUBLE, values.len() as u32, bytes);
    }

    fn ascii(&mut self, tag: u16, text: &str) {
        self.set(tag, TYPE_ASCII, text.len() as u32, text.as_bytes().to_vec());
    }

    fn overflow_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.bytes.len() > 4)
            .map(|e| e.bytes.len() + e.bytes.len() % 2)
            .sum()
    }

    fn encoded_len(&self) -> usize {
        2 + 12 * self.entries.len() + 4 + self.overflow_len()
    }

    fn write(&self, out: &mut Vec<u8>, offset: u32, next_ifd: u32) -> Result<()> {
        let mut overflow_at = offset + (2 + 12 * self.entries.len() + 4) as u32;
        let mut overflow = Vec::with_capacity(self.overflow_len());

        out.write_u16::<LittleEndian>(self.entries.len() as u16)?;
        for e in &self.entries {
            out.write_u16::<LittleEndian>(e.tag)?;
            out.write_u16::<LittleEndian>(e.field_type)?;
            out.write_u32::<LittleEndian>(e.count)?;
            if e.bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..e.bytes.len()].copy_from_slice(&e.bytes);
                out.extend_from_slice(&inline);
            } else {
                out.write_u32::<LittleEndian>(overflow_at)?;
                overflow.extend_from_slice(&e.bytes);
                if e.bytes.len() % 2 == 1 {
                    overflow.push(0);
                }
                overflow_at += (e.bytes.len() + e.bytes.len() % 2) as u32;
            }
        }
        out.write_u32::<LittleEndian>(next_ifd)?;
        out.extend_from_slice(&overflow);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CRS;
    use crate::io::{read_geotiff, read_geotiff_from_buffer};
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn sample(rows: usize, cols: usize, epsg: u32) -> Raster<f32> {
        let data = (0..rows * cols).map(|i| i as f32 * 0.5).collect();
        let mut r = Raster::from_vec(data, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(600_000.0, 5_000_000.0, 20.0, -20.0));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn roundtrip_preserves_crs_dims_and_values() {
        let raster = sample(37, 53, 32632);
        let opts = CogWriteOptions {
            tile_size: 16,
            ..Default::default()
        };
        let bytes = write_cog_to_buffer(&raster, &opts).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (37, 53));
        assert_eq!(back.crs(), Some(&CRS::from_epsg(32632)));
        assert_eq!(back.nodata(), Some(-9999.0));
        assert_relative_eq!(back.transform().origin_x, 600_000.0);
        assert_relative_eq!(back.transform().pixel_height, -20.0);
        assert_eq!(back.data(), raster.data());
    }

    #[test]
    fn writes_overviews_before_data() {
        let raster = sample(40, 70, 32633);
        let opts = CogWriteOptions {
            tile_size: 16,
            ..Default::default()
        };
        let bytes = write_cog_to_buffer(&raster, &opts).unwrap();

        // 70 → 35 → 18 → 9: three overview levels after the full resolution
        let mut count = 0;
        let mut offset = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let mut last_ifd_end = 0;
        while offset != 0 {
            count += 1;
            let n = u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
            let next_at = offset + 2 + 12 * n;
            last_ifd_end = last_ifd_end.max(next_at + 4);
            offset = u32::from_le_bytes(bytes[next_at..next_at + 4].try_into().unwrap()) as usize;
        }
        assert_eq!(count, 4);
        assert!(last_ifd_end < bytes.len());
    }

    #[test]
    fn nan_cells_written_as_nodata() {
        let mut raster = sample(4, 4, 4326);
        raster.set(1, 1, f32::NAN).unwrap();
        let bytes = write_cog_to_buffer(&raster, &CogWriteOptions::default()).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&bytes).unwrap();
        assert_eq!(back.get(1, 1).unwrap(), -9999.0);
        assert_eq!(back.crs(), Some(&CRS::wgs84()));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lai.tif");
        write_cog(&sample(10, 12, 32721), &path, &CogWriteOptions::default()).unwrap();
        let back: Raster<f32> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), (10, 12));
        assert_eq!(back.crs().map(|c| c.epsg()), Some(32721));
    }

    #[test]
    fn rejects_missing_crs() {
        let mut raster = sample(4, 4, 4326);
        raster.set_crs(None);
        assert!(write_cog_to_buffer(&raster, &CogWriteOptions::default()).is_err());
    }
}
