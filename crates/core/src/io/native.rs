//! GeoTIFF reading
//!
//! Uses the `tiff` crate for decoding; georeferencing comes from
//! ModelPixelScale + ModelTiepoint, the CRS from the GeoKeyDirectory and the
//! no-data value from the GDAL_NODATA ASCII tag.

use super::geokeys::decode_epsg;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::{PlanarConfiguration, Tag};

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufReader::new(File::open(path.as_ref())?);
    first_band(decode_bands(file)?)
}

/// Read the first band of an in-memory GeoTIFF
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    first_band(decode_bands(Cursor::new(data))?)
}

/// Read every band of an in-memory GeoTIFF (chunky or planar layout).
///
/// All bands share the file's transform, CRS and no-data value.
pub fn read_bands_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Vec<Raster<T>>> {
    decode_bands(Cursor::new(data))
}

fn first_band<T: RasterElement>(bands: Vec<Raster<T>>) -> Result<Raster<T>> {
    bands
        .into_iter()
        .next()
        .ok_or_else(|| Error::Tiff("image has no samples".into()))
}

fn decode_bands<T, R>(reader: R) -> Result<Vec<Raster<T>>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;
    let samples = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
        .unwrap_or(1) as usize;
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        .and_then(PlanarConfiguration::from_u16)
        == Some(PlanarConfiguration::Planar);

    let transform = read_geotransform(&mut decoder);
    let crs = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .and_then(|keys| decode_epsg(&keys))
        .map(CRS::from_epsg);
    let nodata = decoder
        .find_tag(Tag::GdalNodata)?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok());

    let values = to_f64(decoder.read_image()?)?;
    let pixels = rows * cols;
    let band_data: Vec<Vec<f64>> = if samples == 1 {
        vec![values]
    } else if planar {
        // tiff decodes the first plane only for planar images
        vec![values]
    } else {
        if values.len() != pixels * samples {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        (0..samples)
            .map(|b| values.iter().skip(b).step_by(samples).copied().collect())
            .collect()
    };

    band_data
        .into_iter()
        .map(|data| {
            if data.len() != pixels {
                return Err(Error::InvalidDimensions {
                    width: cols,
                    height: rows,
                });
            }
            let cells = data
                .into_iter()
                .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
                .collect();
            let mut raster = Raster::from_vec(cells, rows, cols)?;
            if let Some(gt) = transform {
                raster.set_transform(gt);
            }
            raster.set_crs(crs);
            raster.set_nodata(nodata.and_then(num_traits::cast));
            Ok(raster)
        })
        .collect()
}

fn to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    fn widen<V: Copy + Into<f64>>(buf: Vec<V>) -> Vec<f64> {
        buf.into_iter().map(Into::into).collect()
    }

    Ok(match result {
        DecodingResult::F32(buf) => widen(buf),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => widen(buf),
        DecodingResult::U16(buf) => widen(buf),
        DecodingResult::U32(buf) => widen(buf),
        DecodingResult::I8(buf) => widen(buf),
        DecodingResult::I16(buf) => widen(buf),
        DecodingResult::I32(buf) => widen(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    })
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, `None` if absent
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}
