//! Tile decompression and sample decoding for COG tiles.
//!
//! Supports DEFLATE (via `flate2`), LZW (via `weezl`) and uncompressed
//! tiles, with the horizontal differencing predictor undone afterwards.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_traits::{AsPrimitive, WrappingAdd};

use crate::error::{CloudError, Result};
use crate::ifd::{IfdInfo, TiffByteOrder};

/// TIFF compression codes.
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// TIFF predictor codes.
pub mod predictor {
    pub const NONE: u16 = 1;
    pub const HORIZONTAL: u16 = 2;
}

/// Decompress raw tile bytes according to the compression method.
pub fn decompress_tile(data: &[u8], compression_code: u16, expected_raw_size: usize) -> Result<Vec<u8>> {
    match compression_code {
        compression::NONE => Ok(data.to_vec()),

        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            // TIFF writers use zlib framing; some emit raw deflate.
            let mut out = Vec::with_capacity(expected_raw_size);
            if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| CloudError::Decompress(format!("DEFLATE: {}", e)))?;
            Ok(out)
        }

        compression::LZW => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| CloudError::Decompress(format!("LZW: {}", e))),

        _ => Err(CloudError::UnsupportedCompression(compression_code)),
    }
}

/// Decode a decompressed tile into `f32` samples in row-major, pixel
/// interleaved order, undoing the predictor on the way.
pub fn decode_samples(raw: &[u8], info: &IfdInfo, order: TiffByteOrder) -> Result<Vec<f32>> {
    let bps = info.bits_per_sample;
    let sf = info.sample_format;
    let float = sf == sample_format::FLOAT;

    match info.predictor {
        predictor::NONE => {}
        predictor::HORIZONTAL if !float => {}
        other => return Err(CloudError::UnsupportedPredictor(other)),
    }

    match (bps, sf) {
        (8, sample_format::UNSIGNED_INT) => Ok(integers(raw.to_vec(), info)),
        (8, sample_format::SIGNED_INT) => Ok(integers(raw.iter().map(|&b| b as i8).collect(), info)),
        (16, sample_format::UNSIGNED_INT) => Ok(integers(words(raw, 2, order, |c, o| read_u16(o, c)), info)),
        (16, sample_format::SIGNED_INT) => Ok(integers(words(raw, 2, order, |c, o| read_u16(o, c) as i16), info)),
        (32, sample_format::UNSIGNED_INT) => Ok(integers(words(raw, 4, order, |c, o| read_u32(o, c)), info)),
        (32, sample_format::SIGNED_INT) => Ok(integers(words(raw, 4, order, |c, o| read_u32(o, c) as i32), info)),
        (32, sample_format::FLOAT) => Ok(words(raw, 4, order, |c, o| f32::from_bits(read_u32(o, c)))),
        (64, sample_format::FLOAT) => Ok(words(raw, 8, order, |c, o| f64::from_bits(read_u64(o, c)) as f32)),
        _ => Err(CloudError::UnsupportedDataType { bps, sf }),
    }
}

fn words<T>(raw: &[u8], width: usize, order: TiffByteOrder, read: impl Fn(&[u8], TiffByteOrder) -> T) -> Vec<T> {
    raw.chunks_exact(width).map(|c| read(c, order)).collect()
}

fn integers<T>(mut values: Vec<T>, info: &IfdInfo) -> Vec<f32>
where
    T: WrappingAdd + AsPrimitive<f32>,
{
    if info.predictor == predictor::HORIZONTAL {
        undo_horizontal(&mut values, info.tile_width as usize, info.samples_per_pixel.max(1) as usize);
    }
    values.into_iter().map(|v| v.as_()).collect()
}

/// Reverse horizontal differencing: each sample is stored as the difference
/// from the same sample of the previous pixel in the row.
fn undo_horizontal<T: WrappingAdd + Copy>(values: &mut [T], row_pixels: usize, samples_per_pixel: usize) {
    let row_len = row_pixels * samples_per_pixel;
    if row_len == 0 {
        return;
    }
    for row in values.chunks_mut(row_len) {
        for i in samples_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(&row[i - samples_per_pixel]);
        }
    }
}

fn read_u16(order: TiffByteOrder, data: &[u8]) -> u16 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(data),
        TiffByteOrder::BigEndian => BigEndian::read_u16(data),
    }
}

fn read_u32(order: TiffByteOrder, data: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(data),
        TiffByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

fn read_u64(order: TiffByteOrder, data: &[u8]) -> u64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u64(data),
        TiffByteOrder::BigEndian => BigEndian::read_u64(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn info(bps: u16, sf: u16, predictor: u16, tile_width: u32) -> IfdInfo {
        IfdInfo {
            width: tile_width,
            height: 1,
            tile_width,
            tile_height: 1,
            tile_offsets: vec![],
            tile_byte_counts: vec![],
            bits_per_sample: bps,
            sample_format: sf,
            compression: compression::NONE,
            predictor,
            samples_per_pixel: 1,
            planar_config: 1,
        }
    }

    #[test]
    fn test_uncompressed_passthrough() {
        let data = vec![1, 2, 3, 4];
        assert_eq!(decompress_tile(&data, compression::NONE, 4).unwrap(), data);
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let original: Vec<u8> = (0..=255).cycle().take(4096).collect();

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&original).unwrap();
        let zlib = zlib.finish().unwrap();
        assert_eq!(decompress_tile(&zlib, compression::DEFLATE, 4096).unwrap(), original);

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(&original).unwrap();
        let raw = raw.finish().unwrap();
        assert_eq!(decompress_tile(&raw, compression::ADOBE_DEFLATE, 4096).unwrap(), original);
    }

    #[test]
    fn test_lzw() {
        let original: Vec<u8> = b"sentinel-2 sentinel-2 sentinel-2".to_vec();
        let encoded = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();
        assert_eq!(decompress_tile(&encoded, compression::LZW, original.len()).unwrap(), original);
    }

    #[test]
    fn test_unsupported_compression() {
        assert!(matches!(
            decompress_tile(&[0], 7, 1),
            Err(CloudError::UnsupportedCompression(7))
        ));
    }

    #[test]
    fn test_decode_u16_little_endian() {
        let raw: Vec<u8> = [100u16, 2500, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let values = decode_samples(&raw, &info(16, 1, 1, 3), TiffByteOrder::LittleEndian).unwrap();
        assert_eq!(values, vec![100.0, 2500.0, 0.0]);
    }

    #[test]
    fn test_horizontal_predictor_u16() {
        // 1000, 1010, 1005 stored as differences; wraps for the negative step
        let diffs = [1000u16, 10, 5u16.wrapping_neg()];
        let raw: Vec<u8> = diffs.iter().flat_map(|v| v.to_be_bytes()).collect();
        let values = decode_samples(&raw, &info(16, 1, 2, 3), TiffByteOrder::BigEndian).unwrap();
        assert_eq!(values, vec![1000.0, 1010.0, 1005.0]);
    }

    #[test]
    fn test_predictor_restarts_each_row() {
        let mut values = vec![5u8, 1, 1, 7, 2, 2];
        undo_horizontal(&mut values, 3, 1);
        assert_eq!(values, vec![5, 6, 7, 7, 9, 11]);
    }

    #[test]
    fn test_decode_f32_and_rejects_float_predictor() {
        let raw: Vec<u8> = [0.25f32, -1.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let values = decode_samples(&raw, &info(32, 3, 1, 2), TiffByteOrder::LittleEndian).unwrap();
        assert_eq!(values, vec![0.25, -1.5]);

        assert!(matches!(
            decode_samples(&raw, &info(32, 3, 3, 2), TiffByteOrder::LittleEndian),
            Err(CloudError::UnsupportedPredictor(3))
        ));
    }

    #[test]
    fn test_unsupported_data_type() {
        assert!(matches!(
            decode_samples(&[0; 3], &info(24, 1, 1, 1), TiffByteOrder::LittleEndian),
            Err(CloudError::UnsupportedDataType { bps: 24, sf: 1 })
        ));
    }
}
