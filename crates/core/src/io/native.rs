//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for TIFF I/O plus the handful of GeoTIFF tags
//! needed to georeference a single-band scene: pixel scale, tiepoint,
//! the GeoKey directory (EPSG code) and GDAL's nodata tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// The decoder maps known codes to named variants, so lookups by an
/// unknown-tag wrapper never match them.
fn geotiff_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read a GeoTIFF file into a Raster
///
/// Native reader: first band only, geotransform from scale/tiepoint,
/// CRS from the GeoKey directory.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file), band)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

fn cast_buffer<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    if band.is_some_and(|b| b != 1) {
        return Err(Error::UnsupportedDataType(
            "native GeoTIFF reader only supports band 1".to_string(),
        ));
    }

    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_buffer(buf),
        DecodingResult::F64(buf) => cast_buffer(buf),
        DecodingResult::U8(buf) => cast_buffer(buf),
        DecodingResult::U16(buf) => cast_buffer(buf),
        DecodingResult::U32(buf) => cast_buffer(buf),
        DecodingResult::I8(buf) => cast_buffer(buf),
        DecodingResult::I16(buf) => cast_buffer(buf),
        DecodingResult::I32(buf) => cast_buffer(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        // Multi-sample (RGB, interleaved) images land here
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    if let Ok(keys) = decoder.get_tag_u16_vec(geotiff_tag(GEO_KEY_DIRECTORY)) {
        raster.set_crs(parse_geokey_epsg(&keys).map(CRS::from_epsg));
    }

    if let Ok(text) = decoder.get_tag_ascii_string(geotiff_tag(GDAL_NODATA)) {
        if let Ok(value) = text.trim_end_matches('\0').trim().parse::<f64>() {
            raster.set_nodata(num_traits::cast(value));
        }
    }

    Ok(raster)
}

/// Attempt to read GeoTransform from ModelPixelScale + ModelTiepoint
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geotiff_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Extract the EPSG code from a GeoKeyDirectory.
///
/// Layout: `[version, revision, minor, count, (key, location, count, value)*]`.
/// Only keys stored inline (location 0) are considered.
pub(crate) fn parse_geokey_epsg(keys: &[u16]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == u16::MAX {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_KEY => return Some(value as u32),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value as u32),
            _ => {}
        }
    }
    geographic
}

/// Build a GeoKeyDirectory for the given CRS.
fn build_geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(|c| c.epsg())
        .and_then(|code| u16::try_from(code).ok());

    let mut keys: Vec<u16> = vec![1, 1, 0, 0];
    match epsg {
        Some(4326) => {
            keys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, 2]);
            keys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]);
            keys.extend_from_slice(&[GEOGRAPHIC_TYPE_KEY, 0, 1, 4326]);
        }
        Some(code) => {
            keys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, 1]);
            keys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]);
            keys.extend_from_slice(&[PROJECTED_CS_TYPE_KEY, 0, 1, code]);
        }
        None => {
            keys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, 1]);
            keys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]);
        }
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    keys
}

/// Write a Raster to a GeoTIFF file
///
/// Writes uncompressed 32-bit float; no-data cells become NaN.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if v.is_nodata(nodata) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(geotiff_tag(MODEL_PIXEL_SCALE), scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(geotiff_tag(MODEL_TIEPOINT), tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let geokeys = build_geokeys(raster.crs());
    image
        .encoder()
        .write_tag(geotiff_tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if nodata.is_some() {
        // nodata cells are written as NaN
        image
            .encoder()
            .write_tag(geotiff_tag(GDAL_NODATA), "nan")
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geokeys_roundtrip_projected() {
        let keys = build_geokeys(Some(&CRS::from_epsg(32633)));
        assert_eq!(keys[3], 3);
        assert_eq!(parse_geokey_epsg(&keys), Some(32633));
    }

    #[test]
    fn geokeys_geographic_and_unknown() {
        let keys = build_geokeys(Some(&CRS::wgs84()));
        assert_eq!(parse_geokey_epsg(&keys), Some(4326));

        let keys = build_geokeys(None);
        assert_eq!(keys[3], 2);
        assert_eq!(parse_geokey_epsg(&keys), None);
    }

    #[test]
    fn buffer_roundtrip_keeps_georeferencing() {
        let mut raster = Raster::from_vec(vec![1.0f64, 2.0, f64::NAN, 4.0, 5.0, 6.0], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(300_000.0, 4_500_000.0, 30.0, -30.0));
        raster.set_crs(Some(CRS::from_epsg(32630)));
        raster.set_nodata(Some(f64::NAN));

        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes, None).unwrap();

        assert_eq!(loaded.shape(), (2, 3));
        assert_eq!(loaded.get(1, 2).unwrap(), 6.0);
        assert!(loaded.get(0, 2).unwrap().is_nan());
        assert_eq!(loaded.get(1, 0).unwrap(), 4.0);
        assert_eq!(loaded.transform().origin_x, 300_000.0);
        assert_eq!(loaded.transform().origin_y, 4_500_000.0);
        assert_eq!(loaded.transform().pixel_width, 30.0);
        assert_eq!(loaded.transform().pixel_height, -30.0);
        assert!(loaded.nodata().is_some_and(f64::is_nan));
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32630));
    }

    #[test]
    fn file_roundtrip_keeps_transform_and_crs() {
        let mut raster: Raster<f64> = Raster::filled(4, 5, 12_000.0);
        raster.set_transform(GeoTransform::new(439_700.0, 4_474_860.0, 30.0, -30.0));
        raster.set_crs(Some(CRS::from_epsg(32630)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_B4.TIF");
        write_geotiff(&raster, &path).unwrap();
        let loaded: Raster<f64> = read_geotiff(&path, None).unwrap();

        assert!(loaded.transform().is_aligned_with(raster.transform()));
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32630));
        assert_eq!(loaded.nodata(), None);
        assert_eq!(loaded.get(3, 4).unwrap(), 12_000.0);
    }

    #[test]
    fn tag_lookup_uses_named_variants() {
        assert_eq!(geotiff_tag(MODEL_PIXEL_SCALE), Tag::ModelPixelScaleTag);
        assert_eq!(geotiff_tag(GEO_KEY_DIRECTORY), Tag::GeoKeyDirectoryTag);
        assert_eq!(geotiff_tag(GDAL_NODATA).to_u16(), GDAL_NODATA);
    }

    #[test]
    fn native_reader_rejects_other_bands() {
        let raster: Raster<f64> = Raster::new(2, 2);
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        assert!(read_geotiff_from_buffer::<f64>(&bytes, Some(2)).is_err());
    }
}
