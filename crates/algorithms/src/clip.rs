//! Crop and mask a scene to a study-area polygon
//!
//! Cropping trims the grid to the cell-aligned window covering the
//! polygon's bounding box. Masking then sets every cell whose centre falls
//! outside the polygon to NaN in all bands.

use crate::maybe_rayon::*;
use crate::scene::{Band, BandStack};
use geo::{BoundingRect, Contains};
use geo::{Geometry, MultiPolygon, Point, Polygon};
use landcover_core::raster::Raster;
use landcover_core::{Error, FeatureCollection, Result};

/// Merge the polygonal features of a layer into one multipolygon.
///
/// Non-polygon geometries are ignored; a layer without any polygon is an error.
pub fn study_area_geometry(features: &FeatureCollection) -> Result<MultiPolygon<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for geom in features.iter().filter_map(|f| f.geometry.as_ref()) {
        collect_polygons(geom, &mut polygons);
    }
    if polygons.is_empty() {
        return Err(Error::Vector("study area layer contains no polygons".into()));
    }
    Ok(MultiPolygon::new(polygons))
}

fn collect_polygons(geom: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geom {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// Cell window `(row, col, rows, cols)` of `raster` covering `geom`'s bounding box.
///
/// Returns `None` when the geometry does not overlap the grid.
pub fn covering_window<T, G>(raster: &Raster<T>, geom: &G) -> Option<(usize, usize, usize, usize)>
where
    T: landcover_core::RasterElement,
    G: BoundingRect<f64>,
    G::Output: Into<Option<geo::Rect<f64>>>,
{
    let rect: Option<geo::Rect<f64>> = geom.bounding_rect().into();
    let rect = rect?;
    let (min, max) = (rect.min(), rect.max());

    let corners = [
        raster.geo_to_pixel(min.x, min.y),
        raster.geo_to_pixel(min.x, max.y),
        raster.geo_to_pixel(max.x, min.y),
        raster.geo_to_pixel(max.x, max.y),
    ];
    let (mut c0, mut r0) = (f64::INFINITY, f64::INFINITY);
    let (mut c1, mut r1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (c, r) in corners {
        c0 = c0.min(c);
        c1 = c1.max(c);
        r0 = r0.min(r);
        r1 = r1.max(r);
    }
    if ![c0, c1, r0, r1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (rows, cols) = raster.shape();
    let col_start = c0.floor().max(0.0) as usize;
    let row_start = r0.floor().max(0.0) as usize;
    let col_end = (c1.ceil().max(0.0) as usize).min(cols);
    let row_end = (r1.ceil().max(0.0) as usize).min(rows);

    (col_start < col_end && row_start < row_end)
        .then(|| (row_start, col_start, row_end - row_start, col_end - col_start))
}

/// Crop every band to the window covering `area`.
pub fn crop_to_geometry(stack: &BandStack, area: &MultiPolygon<f64>) -> Result<BandStack> {
    let (row, col, rows, cols) = covering_window(stack.template(), area).ok_or_else(|| {
        Error::Algorithm("study area does not overlap the scene extent".into())
    })?;
    stack.try_map(|r| r.window(row, col, rows, cols))
}

/// Per-cell flag: is the cell centre inside `area`? Row-major.
pub fn inside_mask<T>(template: &Raster<T>, area: &MultiPolygon<f64>) -> Vec<bool>
where
    T: landcover_core::RasterElement,
{
    let (rows, cols) = template.shape();
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = template.pixel_to_geo(col, row);
                    area.contains(&Point::new(x, y))
                })
                .collect::<Vec<bool>>()
        })
        .collect()
}

/// Set cells whose centre lies outside `area` to NaN in every band.
pub fn mask_to_geometry(stack: &BandStack, area: &MultiPolygon<f64>) -> Result<BandStack> {
    let inside = inside_mask(stack.template(), area);

    let bands = stack
        .bands()
        .iter()
        .map(|band| {
            let mut raster = band.raster.clone();
            for (value, keep) in raster.data_mut().iter_mut().zip(&inside) {
                if !keep {
                    *value = f64::NAN;
                }
            }
            raster.set_nodata(Some(f64::NAN));
            Band {
                number: band.number,
                raster,
            }
        })
        .collect();

    BandStack::new(bands)
}

/// Crop then mask a scene to the study area.
pub fn clip_to_study_area(stack: &BandStack, area: &MultiPolygon<f64>) -> Result<BandStack> {
    let cropped = crop_to_geometry(stack, area)?;
    mask_to_geometry(&cropped, area)
}
