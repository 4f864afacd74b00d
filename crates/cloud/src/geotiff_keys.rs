//! GeoTIFF key extraction from IFD entries.
//!
//! Reads tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory) and
//! 42113 (GDAL_NODATA) to produce a `GeoTransform`, optional `CRS`
//! and optional nodata value.

use std::collections::HashMap;

use s2cuts_core::crs::CRS;
use s2cuts_core::io::geokeys::decode_epsg;
use s2cuts_core::raster::GeoTransform;

use crate::ifd::{self, tags, RawIfd, TiffByteOrder};

/// Tag values keyed by tag ID, inline or fetched from their offsets.
pub type TagValues = HashMap<u16, Vec<u8>>;

/// GeoTIFF metadata extracted from IFD entries.
#[derive(Debug, Clone)]
pub struct GeoTiffMeta {
    pub geo_transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

/// Extract GeoTIFF metadata from an IFD and its resolved tag values.
pub fn extract_geotiff_meta(byte_order: TiffByteOrder, ifd: &RawIfd, values: &TagValues) -> GeoTiffMeta {
    GeoTiffMeta {
        geo_transform: extract_geotransform(byte_order, ifd, values),
        crs: extract_crs(byte_order, ifd, values),
        nodata: extract_nodata(ifd, values),
    }
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or from the
/// ModelTransformation matrix.
fn extract_geotransform(byte_order: TiffByteOrder, ifd: &RawIfd, values: &TagValues) -> GeoTransform {
    let scale = f64_values(byte_order, ifd, values, tags::MODEL_PIXEL_SCALE);
    let tiepoint = f64_values(byte_order, ifd, values, tags::MODEL_TIEPOINT);

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]);
        }
    }

    // Row-major 4x4: x = t[3] + col*t[0] + row*t[1], y = t[7] + col*t[4] + row*t[5]
    if let Some(t) = f64_values(byte_order, ifd, values, tags::MODEL_TRANSFORMATION) {
        if t.len() >= 16 {
            return GeoTransform::from_gdal([t[3], t[0], t[1], t[7], t[4], t[5]]);
        }
    }

    GeoTransform::default()
}

fn extract_crs(byte_order: TiffByteOrder, ifd: &RawIfd, values: &TagValues) -> Option<CRS> {
    let entry = ifd.entry(tags::GEO_KEY_DIRECTORY)?;
    let data = values.get(&tags::GEO_KEY_DIRECTORY)?;
    let directory: Vec<u16> = ifd::decode_u64s(byte_order, entry, data)
        .into_iter()
        .map(|v| v as u16)
        .collect();
    decode_epsg(&directory).map(CRS::from_epsg)
}

fn extract_nodata(ifd: &RawIfd, values: &TagValues) -> Option<f64> {
    let entry = ifd.entry(tags::GDAL_NODATA)?;
    let data = values.get(&tags::GDAL_NODATA)?;
    ifd::decode_ascii(entry, data).trim().parse::<f64>().ok()
}

fn f64_values(byte_order: TiffByteOrder, ifd: &RawIfd, values: &TagValues, tag: u16) -> Option<Vec<f64>> {
    let entry = ifd.entry(tag)?;
    let values = ifd::decode_f64s(byte_order, entry, values.get(&tag)?);
    (!values.is_empty()).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::RawTagEntry;

    fn entry(tag: u16, type_id: u16, count: u32) -> RawTagEntry {
        RawTagEntry {
            tag,
            type_id,
            count,
            value_bytes: [0; 4],
        }
    }

    fn doubles(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_geotransform_crs_nodata() {
        let order = TiffByteOrder::LittleEndian;
        let ifd = RawIfd {
            entries: vec![
                entry(tags::MODEL_PIXEL_SCALE, 12, 3),
                entry(tags::MODEL_TIEPOINT, 12, 6),
                entry(tags::GEO_KEY_DIRECTORY, 3, 16),
                entry(tags::GDAL_NODATA, 2, 2),
            ],
            next_ifd_offset: 0,
        };

        let keys: Vec<u8> = [1u16, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32632]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let mut values = TagValues::new();
        values.insert(tags::MODEL_PIXEL_SCALE, doubles(&[10.0, 10.0, 0.0]));
        values.insert(tags::MODEL_TIEPOINT, doubles(&[0.0, 0.0, 0.0, 600000.0, 5000040.0, 0.0]));
        values.insert(tags::GEO_KEY_DIRECTORY, keys);
        values.insert(tags::GDAL_NODATA, b"0\0".to_vec());

        let meta = extract_geotiff_meta(order, &ifd, &values);
        assert_eq!(meta.geo_transform.origin_x, 600000.0);
        assert_eq!(meta.geo_transform.origin_y, 5000040.0);
        assert_eq!(meta.geo_transform.pixel_width, 10.0);
        assert_eq!(meta.geo_transform.pixel_height, -10.0);
        assert_eq!(meta.crs, Some(CRS::from_epsg(32632)));
        assert_eq!(meta.nodata, Some(0.0));
    }

    #[test]
    fn test_missing_tags() {
        let ifd = RawIfd {
            entries: vec![],
            next_ifd_offset: 0,
        };
        let meta = extract_geotiff_meta(TiffByteOrder::LittleEndian, &ifd, &TagValues::new());
        assert!(meta.crs.is_none());
        assert!(meta.nodata.is_none());
    }
}
