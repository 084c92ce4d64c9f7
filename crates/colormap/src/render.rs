//! Class-raster to RGBA rendering and PNG output.

use crate::legend::Legend;
use crate::palette::{CategoricalPalette, Rgb};
use image::{Rgba, RgbaImage};
use landcover_core::raster::{Raster, RasterElement};
use landcover_core::{Error, Result};
use std::path::Path;

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Convert a class-code raster to an RGBA pixel buffer.
///
/// Returns `rows * cols * 4` bytes in row-major order. Code `k` takes
/// palette colour `k - 1`; nodata and NaN cells are transparent. A code
/// without a colour is an error.
pub fn classified_to_rgba<T: RasterElement>(
    raster: &Raster<T>,
    palette: &CategoricalPalette,
) -> Result<Vec<u8>> {
    let nodata = raster.nodata();
    let mut rgba = Vec::with_capacity(raster.len() * 4);

    for val in raster.data().iter() {
        if val.is_nodata(nodata) {
            rgba.extend_from_slice(&TRANSPARENT);
            continue;
        }
        match val.to_f64() {
            Some(v) if v.is_finite() => {
                let color = (v >= 1.0 && v.fract() == 0.0)
                    .then(|| palette.color(v as usize))
                    .flatten()
                    .ok_or_else(|| {
                        Error::Algorithm(format!(
                            "class code {v} has no colour in a {}-colour palette",
                            palette.len()
                        ))
                    })?;
                rgba.extend_from_slice(&color.to_rgba());
            }
            _ => rgba.extend_from_slice(&TRANSPARENT),
        }
    }

    Ok(rgba)
}

/// Append a legend column of `swatch`-sized squares to the right of `map`.
///
/// Swatches are stacked top to bottom in code order with a `swatch / 4`
/// margin; the canvas grows vertically when the legend is taller than the map.
pub fn render_legend_swatches(map: &RgbaImage, legend: &Legend, swatch: u32) -> Result<RgbaImage> {
    let swatch = swatch.max(1);
    let margin = (swatch / 4).max(1);
    let step = swatch + margin;
    let legend_w = swatch + 2 * margin;
    let legend_h = margin + step * legend.len() as u32;

    let width = map.width() + legend_w;
    let height = map.height().max(legend_h);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, map, 0, 0);

    for (i, entry) in legend.entries.iter().enumerate() {
        let color = Rgb::from_hex(&entry.color)?;
        let x0 = map.width() + margin;
        let y0 = margin + step * i as u32;
        for y in y0..y0 + swatch {
            for x in x0..x0 + swatch {
                canvas.put_pixel(x, y, Rgba(color.to_rgba()));
            }
        }
    }

    Ok(canvas)
}

/// Render a class-code raster with its legend into one image.
pub fn render_map<T: RasterElement>(
    raster: &Raster<T>,
    palette: &CategoricalPalette,
    legend: &Legend,
    swatch: u32,
) -> Result<RgbaImage> {
    let (rows, cols) = raster.shape();
    let rgba = classified_to_rgba(raster, palette)?;
    let map = RgbaImage::from_raw(cols as u32, rows as u32, rgba)
        .ok_or_else(|| Error::Other("RGBA buffer does not match raster size".into()))?;
    render_legend_swatches(&map, legend, swatch)
}

/// Write an RGBA buffer as PNG.
pub fn write_png<P: AsRef<Path>>(path: P, rgba: &[u8], width: u32, height: u32) -> Result<()> {
    let img = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or(Error::SizeMismatch {
        er: height as usize,
        ec: width as usize * 4,
        ar: rgba.len() / (width as usize * 4).max(1),
        ac: width as usize * 4,
    })?;
    save_png(path, &img)
}

pub fn save_png<P: AsRef<Path>>(path: P, img: &RgbaImage) -> Result<()> {
    img.save_with_format(path.as_ref(), image::ImageFormat::Png)
        .map_err(|e| Error::Other(format!("PNG write failed: {e}")))
}
