//! Band discovery and multi-band scene stacking
//!
//! Satellite products ship one GeoTIFF per spectral band with the band
//! number embedded in the file name (`LC08_..._SR_B4.TIF`). This module
//! finds those files, reads them and stacks them into a [`BandStack`]
//! sharing one grid.

use landcover_core::io::read_geotiff;
use landcover_core::raster::{GeoTransform, Raster};
use landcover_core::{Error, Result, CRS};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default file-name pattern: `_B<number>.tif` (case-insensitive).
pub const DEFAULT_BAND_PATTERN: &str = r"(?i)_B(\d+)\.tiff?$";

/// A band file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandFile {
    pub number: u32,
    pub path: PathBuf,
}

/// One spectral band of a scene.
#[derive(Debug, Clone)]
pub struct Band {
    pub number: u32,
    pub raster: Raster<f64>,
}

/// Bands of one scene on a common grid.
///
/// Invariants: at least one band, band numbers strictly increasing,
/// every band has the same shape and geotransform.
#[derive(Debug, Clone)]
pub struct BandStack {
    bands: Vec<Band>,
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern).map_err(|e| Error::InvalidParameter {
        name: "band_pattern",
        value: pattern.to_string(),
        reason: e.to_string(),
    })?;
    if re.captures_len() < 2 {
        return Err(Error::InvalidParameter {
            name: "band_pattern",
            value: pattern.to_string(),
            reason: "pattern needs a capture group for the band number".into(),
        });
    }
    Ok(re)
}

/// Band number encoded in `file_name`, if it matches `pattern`.
pub fn band_number(pattern: &Regex, file_name: &str) -> Option<u32> {
    pattern.captures(file_name)?.get(1)?.as_str().parse().ok()
}

/// List the band files of `dir` matching `pattern`, sorted by band number.
///
/// Fails when nothing matches or when two files claim the same band.
pub fn discover_bands<P: AsRef<Path>>(dir: P, pattern: &str) -> Result<Vec<BandFile>> {
    let dir = dir.as_ref();
    let re = compile_pattern(pattern)?;

    let mut found: BTreeMap<u32, PathBuf> = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = band_number(&re, name) else {
            continue;
        };
        if let Some(previous) = found.insert(number, path.clone()) {
            return Err(Error::InvalidParameter {
                name: "bands_dir",
                value: dir.display().to_string(),
                reason: format!(
                    "band {} matched by both {} and {}",
                    number,
                    previous.display(),
                    path.display()
                ),
            });
        }
    }

    if found.is_empty() {
        return Err(Error::InvalidParameter {
            name: "bands_dir",
            value: dir.display().to_string(),
            reason: format!("no files match band pattern {pattern}"),
        });
    }

    Ok(found
        .into_iter()
        .map(|(number, path)| BandFile { number, path })
        .collect())
}

/// Discover, read and stack the bands of a scene.
///
/// `select` restricts the stack to the listed band numbers; each must exist.
pub fn load_band_stack<P: AsRef<Path>>(
    dir: P,
    pattern: &str,
    select: Option<&[u32]>,
) -> Result<BandStack> {
    let mut files = discover_bands(dir, pattern)?;

    if let Some(wanted) = select {
        for number in wanted {
            if !files.iter().any(|f| f.number == *number) {
                return Err(Error::InvalidParameter {
                    name: "bands",
                    value: number.to_string(),
                    reason: "band not found in bands directory".into(),
                });
            }
        }
        files.retain(|f| wanted.contains(&f.number));
    }

    let mut bands = Vec::with_capacity(files.len());
    for file in &files {
        let raster: Raster<f64> = read_geotiff(&file.path, None)?;
        debug!(band = file.number, path = %file.path.display(), rows = raster.rows(), cols = raster.cols(), "read band");
        bands.push(Band {
            number: file.number,
            raster: raster.to_f64(),
        });
    }

    let stack = BandStack::new(bands)?;
    let (rows, cols) = stack.shape();
    info!(bands = ?stack.band_numbers(), rows, cols, "stacked scene");
    Ok(stack)
}

impl BandStack {
    /// Stack bands, sorting them by band number and validating the grid.
    pub fn new(mut bands: Vec<Band>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::Algorithm("a band stack needs at least one band".into()));
        }
        bands.sort_by_key(|b| b.number);

        let first = &bands[0].raster;
        let (rows, cols) = first.shape();
        let transform = *first.transform();
        let crs = first.crs().cloned();

        for pair in bands.windows(2) {
            if pair[0].number == pair[1].number {
                return Err(Error::InvalidParameter {
                    name: "bands",
                    value: pair[0].number.to_string(),
                    reason: "duplicate band number".into(),
                });
            }
        }

        for band in &bands[1..] {
            let r = &band.raster;
            if r.shape() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: r.rows(),
                    ac: r.cols(),
                });
            }
            if !r.transform().is_aligned_with(&transform) {
                return Err(Error::Algorithm(format!(
                    "band {} is not aligned with band {}",
                    band.number, bands[0].number
                )));
            }
            if let (Some(a), Some(b)) = (crs.as_ref(), r.crs()) {
                if !a.is_equivalent(b) {
                    return Err(Error::CrsMismatch(a.to_string(), b.to_string()));
                }
            }
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Raster of band `number`, if present.
    pub fn band(&self, number: u32) -> Option<&Raster<f64>> {
        self.bands
            .iter()
            .find(|b| b.number == number)
            .map(|b| &b.raster)
    }

    pub fn band_numbers(&self) -> Vec<u32> {
        self.bands.iter().map(|b| b.number).collect()
    }

    /// Model feature names, one per band: `B2`, `B3`, ...
    pub fn feature_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| format!("B{}", b.number)).collect()
    }

    /// Grid shape `(rows, cols)` shared by all bands.
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].raster.shape()
    }

    pub fn transform(&self) -> &GeoTransform {
        self.bands[0].raster.transform()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.bands[0].raster.crs()
    }

    /// The first band, used as a template for derived single-band rasters.
    pub fn template(&self) -> &Raster<f64> {
        &self.bands[0].raster
    }

    /// Write the band values at `(row, col)` into `out`.
    ///
    /// Returns `false` when any band is non-finite at that cell.
    /// `out` must hold `self.len()` values and the cell must be in bounds.
    pub fn pixel(&self, row: usize, col: usize, out: &mut [f64]) -> bool {
        let mut valid = true;
        for (slot, band) in out.iter_mut().zip(&self.bands) {
            let v = band.raster.data()[(row, col)];
            valid &= v.is_finite();
            *slot = v;
        }
        valid
    }

    /// Number of cells where every band holds a finite value.
    pub fn valid_count(&self) -> usize {
        let (rows, cols) = self.shape();
        let mut buf = vec![0.0; self.len()];
        (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .filter(|&(r, c)| self.pixel(r, c, &mut buf))
            .count()
    }

    /// Apply `f` to every band, keeping band numbers.
    pub fn try_map<F>(&self, f: F) -> Result<BandStack>
    where
        F: Fn(&Raster<f64>) -> Result<Raster<f64>>,
    {
        let bands = self
            .bands
            .iter()
            .map(|b| {
                Ok(Band {
                    number: b.number,
                    raster: f(&b.raster)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        BandStack::new(bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landcover_core::io::write_geotiff;

    fn band(number: u32, value: f64) -> Band {
        let mut raster = Raster::filled(3, 4, value);
        raster.set_transform(GeoTransform::new(100.0, 200.0, 30.0, -30.0));
        Band { number, raster }
    }

    #[test]
    fn band_number_from_landsat_names() {
        let re = compile_pattern(DEFAULT_BAND_PATTERN).unwrap();
        assert_eq!(band_number(&re, "LC08_L2SP_044034_20200731_SR_B4.TIF"), Some(4));
        assert_eq!(band_number(&re, "scene_b10.tiff"), Some(10));
        assert_eq!(band_number(&re, "scene_QA_PIXEL.TIF"), None);
        assert_eq!(band_number(&re, "scene_B4.TIF.aux.xml"), None);
    }

    #[test]
    fn pattern_without_group_is_rejected() {
        assert!(compile_pattern(r"_B\d+\.tif$").is_err());
        assert!(compile_pattern(r"(unclosed").is_err());
    }

    #[test]
    fn stack_sorts_and_validates() {
        let stack = BandStack::new(vec![band(5, 0.5), band(2, 0.2), band(3, 0.3)]).unwrap();
        assert_eq!(stack.band_numbers(), vec![2, 3, 5]);
        assert_eq!(stack.feature_names(), vec!["B2", "B3", "B5"]);
        assert_eq!(stack.band(3).unwrap().get(0, 0).unwrap(), 0.3);

        let mut buf = [0.0; 3];
        assert!(stack.pixel(1, 1, &mut buf));
        assert_eq!(buf, [0.2, 0.3, 0.5]);
        assert_eq!(stack.valid_count(), 12);
    }

    #[test]
    fn stack_rejects_mismatched_grids() {
        assert!(BandStack::new(vec![]).is_err());
        assert!(BandStack::new(vec![band(2, 0.0), band(2, 1.0)]).is_err());

        let mut shifted = band(3, 0.0);
        shifted
            .raster
            .set_transform(GeoTransform::new(115.0, 200.0, 30.0, -30.0));
        assert!(BandStack::new(vec![band(2, 0.0), shifted]).is_err());

        let small = Band {
            number: 4,
            raster: Raster::new(2, 2),
        };
        assert!(matches!(
            BandStack::new(vec![band(2, 0.0), small]),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn pixel_reports_invalid_cells() {
        let mut b = band(2, 1.0);
        b.raster.set(0, 0, f64::NAN).unwrap();
        let stack = BandStack::new(vec![b, band(3, 2.0)]).unwrap();
        let mut buf = [0.0; 2];
        assert!(!stack.pixel(0, 0, &mut buf));
        assert_eq!(stack.valid_count(), 11);
    }

    #[test]
    fn discover_and_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for (n, v) in [(4u32, 400.0), (2, 200.0), (3, 300.0)] {
            let b = band(n, v);
            write_geotiff(&b.raster, dir.path().join(format!("scene_SR_B{n}.TIF"))).unwrap();
        }
        std::fs::write(dir.path().join("scene_MTL.txt"), "metadata").unwrap();

        let files = discover_bands(dir.path(), DEFAULT_BAND_PATTERN).unwrap();
        assert_eq!(files.iter().map(|f| f.number).collect::<Vec<_>>(), vec![2, 3, 4]);

        let stack = load_band_stack(dir.path(), DEFAULT_BAND_PATTERN, Some(&[2, 4])).unwrap();
        assert_eq!(stack.band_numbers(), vec![2, 4]);
        assert_eq!(stack.band(4).unwrap().get(2, 3).unwrap(), 400.0);
        assert_eq!(stack.transform().origin_x, 100.0);

        assert!(load_band_stack(dir.path(), DEFAULT_BAND_PATTERN, Some(&[7])).is_err());
    }

    #[test]
    fn discover_fails_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_bands(dir.path(), DEFAULT_BAND_PATTERN).is_err());
    }
}
