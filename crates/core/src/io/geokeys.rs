//! GeoKeyDirectory encoding and EPSG extraction
//!
//! The directory is a flat `u16` array: a 4-value header
//! `[version, revision, minor, key_count]` followed by one
//! `[key_id, tiff_tag_location, count, value_offset]` quadruple per key.
//! Only keys stored inline (`tiff_tag_location == 0`) are interpreted.

use crate::crs::CRS;

pub const GT_MODEL_TYPE: u16 = 1024;
pub const GT_RASTER_TYPE: u16 = 1025;
pub const GEOGRAPHIC_TYPE: u16 = 2048;
pub const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Build a GeoKeyDirectory for `crs`.
///
/// Returns `None` when the EPSG code does not fit the 16-bit key value.
pub fn encode_geokeys(crs: &CRS) -> Option<Vec<u16>> {
    let code = u16::try_from(crs.epsg()).ok()?;
    let (model, cs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };

    Some(vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        cs_key, 0, 1, code,
    ])
}

/// Extract the EPSG code from a GeoKeyDirectory.
///
/// ProjectedCSTypeGeoKey wins over GeographicTypeGeoKey; user-defined
/// (32767) codes are ignored.
pub fn decode_epsg(directory: &[u16]) -> Option<u32> {
    let value = |key: u16| {
        inline_keys(directory)
            .find(|&(k, _)| k == key)
            .map(|(_, v)| v)
            .filter(|&v| v != 0 && v != USER_DEFINED)
    };

    value(PROJECTED_CS_TYPE)
        .or_else(|| value(GEOGRAPHIC_TYPE))
        .map(u32::from)
}

fn inline_keys(directory: &[u16]) -> impl Iterator<Item = (u16, u16)> + '_ {
    let count = directory.get(3).copied().unwrap_or(0) as usize;
    directory
        .get(4..)
        .unwrap_or(&[])
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
}
