//! TIFF IFD (Image File Directory) parser for remote COG files.
//!
//! Parses IFD entries from raw bytes fetched via HTTP Range requests,
//! without requiring `Read + Seek`. Supports IFD chains (overviews) and
//! both byte orders; BigTIFF is rejected.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CloudError, Result};

/// Byte order of the TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

/// Well-known TIFF tag IDs.
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;

    /// Tags describing the pixel layout of one IFD.
    pub const STRUCTURE: [u16; 12] = [
        IMAGE_WIDTH,
        IMAGE_LENGTH,
        BITS_PER_SAMPLE,
        COMPRESSION,
        SAMPLES_PER_PIXEL,
        PLANAR_CONFIG,
        PREDICTOR,
        TILE_WIDTH,
        TILE_LENGTH,
        TILE_OFFSETS,
        TILE_BYTE_COUNTS,
        SAMPLE_FORMAT,
    ];

    /// Georeferencing tags, read from the full-resolution IFD only.
    pub const GEO: [u16; 5] = [
        MODEL_PIXEL_SCALE,
        MODEL_TIEPOINT,
        MODEL_TRANSFORMATION,
        GEO_KEY_DIRECTORY,
        GDAL_NODATA,
    ];
}

/// Byte size of one value of a TIFF field type.
fn type_byte_size(type_id: u16) -> Option<usize> {
    match type_id {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 => Some(4),    // LONG, SLONG, FLOAT
        5 | 10 | 12 | 16 => Some(8), // RATIONAL, SRATIONAL, DOUBLE, LONG8
        _ => None,
    }
}

/// A raw IFD tag entry before value resolution.
#[derive(Debug, Clone)]
pub struct RawTagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The 4 value bytes exactly as stored: the value itself when it fits,
    /// otherwise the file offset of the value.
    pub value_bytes: [u8; 4],
}

impl RawTagEntry {
    /// Total size of the value in bytes.
    pub fn byte_len(&self) -> u64 {
        type_byte_size(self.type_id).unwrap_or(1) as u64 * self.count as u64
    }

    /// Whether the value is stored inside the entry.
    pub fn is_inline(&self) -> bool {
        self.byte_len() <= 4
    }

    /// File offset of an out-of-line value.
    pub fn offset(&self, order: TiffByteOrder) -> u64 {
        read_u32(order, &self.value_bytes) as u64
    }
}

/// Parsed TIFF header.
#[derive(Debug, Clone)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u32,
}

/// A single parsed IFD with all tag entries and the offset to the next IFD.
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<RawTagEntry>,
    pub next_ifd_offset: u32,
}

impl RawIfd {
    pub fn entry(&self, tag: u16) -> Option<&RawTagEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}

/// Pixel layout of one IFD (full resolution or overview).
#[derive(Debug, Clone)]
pub struct IfdInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub samples_per_pixel: u16,
    pub planar_config: u16,
}

impl IfdInfo {
    /// Number of tiles per tile row.
    pub fn tiles_across(&self) -> usize {
        (self.width as usize).div_ceil(self.tile_width.max(1) as usize)
    }

    /// Number of tile rows.
    pub fn tiles_down(&self) -> usize {
        (self.height as usize).div_ceil(self.tile_height.max(1) as usize)
    }

    /// Bytes of one decompressed tile.
    pub fn raw_tile_size(&self) -> usize {
        let bytes_per_sample = (self.bits_per_sample as usize).div_ceil(8);
        self.tile_width as usize
            * self.tile_height as usize
            * bytes_per_sample
            * self.samples_per_pixel.max(1) as usize
    }
}

/// Parse the 8-byte TIFF header.
pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(CloudError::InvalidTiff {
            reason: "header too short".into(),
        });
    }

    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => {
            return Err(CloudError::InvalidTiff {
                reason: "invalid byte order marker".into(),
            });
        }
    };

    match read_u16(byte_order, &data[2..4]) {
        42 => {}
        43 => {
            return Err(CloudError::InvalidTiff {
                reason: "BigTIFF is not supported".into(),
            })
        }
        magic => {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected magic 42, got {}", magic),
            })
        }
    }

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: read_u32(byte_order, &data[4..8]),
    })
}

/// Number of bytes an IFD with `data[0..2]` entries occupies.
pub fn ifd_len(byte_order: TiffByteOrder, data: &[u8]) -> Option<usize> {
    let count = read_u16(byte_order, data.get(0..2)?) as usize;
    Some(2 + count * 12 + 4)
}

/// Parse one IFD from raw bytes.
///
/// `data` must start at the IFD offset and contain the whole directory
/// including the 4-byte next-IFD pointer.
pub fn parse_ifd(byte_order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    let needed = ifd_len(byte_order, data).ok_or_else(|| CloudError::InvalidTiff {
        reason: "IFD too short".into(),
    })?;
    if data.len() < needed {
        return Err(CloudError::InvalidTiff {
            reason: format!("IFD needs {} bytes but only {} available", needed, data.len()),
        });
    }

    let entries = data[2..needed - 4]
        .chunks_exact(12)
        .map(|raw| RawTagEntry {
            tag: read_u16(byte_order, &raw[0..2]),
            type_id: read_u16(byte_order, &raw[2..4]),
            count: read_u32(byte_order, &raw[4..8]),
            value_bytes: [raw[8], raw[9], raw[10], raw[11]],
        })
        .collect();

    Ok(RawIfd {
        entries,
        next_ifd_offset: read_u32(byte_order, &data[needed - 4..needed]),
    })
}

/// Decode integer values (BYTE, SHORT, LONG, LONG8) from a tag's value bytes.
pub fn decode_u64s(byte_order: TiffByteOrder, entry: &RawTagEntry, data: &[u8]) -> Vec<u64> {
    let width = match entry.type_id {
        1 => 1,
        3 => 2,
        4 => 4,
        16 => 8,
        _ => return Vec::new(),
    };
    data.chunks_exact(width)
        .take(entry.count as usize)
        .map(|c| match width {
            1 => c[0] as u64,
            2 => read_u16(byte_order, c) as u64,
            4 => read_u32(byte_order, c) as u64,
            _ => read_u64(byte_order, c),
        })
        .collect()
}

/// Decode floating-point values (FLOAT, DOUBLE) from a tag's value bytes.
pub fn decode_f64s(byte_order: TiffByteOrder, entry: &RawTagEntry, data: &[u8]) -> Vec<f64> {
    match entry.type_id {
        11 => data
            .chunks_exact(4)
            .take(entry.count as usize)
            .map(|c| read_f32(byte_order, c) as f64)
            .collect(),
        12 => data
            .chunks_exact(8)
            .take(entry.count as usize)
            .map(|c| read_f64(byte_order, c))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a NUL-terminated ASCII value.
pub fn decode_ascii(entry: &RawTagEntry, data: &[u8]) -> String {
    let bytes = &data[..(entry.count as usize).min(data.len())];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

// ---- Byte order helpers ----

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

fn read_f32(order: TiffByteOrder, data: &[u8]) -> f32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f32(data),
        TiffByteOrder::BigEndian => BigEndian::read_f32(data),
    }
}

fn read_f64(order: TiffByteOrder, data: &[u8]) -> f64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f64(data),
        TiffByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}
