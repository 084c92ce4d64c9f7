//! Digital number to surface reflectance conversion
//!
//! `reflectance = DN * scale + offset`, optionally expressed in percent.
//! DNs outside the product's valid range are removed (NaN) before scaling,
//! so saturated or negative-reflectance pixels never reach training or
//! prediction. Defaults follow Landsat Collection 2 Level-2 surface
//! reflectance products, whose valid DN range 7273-43636 maps to 0-1.

use crate::maybe_rayon::*;
use crate::scene::BandStack;
use landcover_core::raster::Raster;
use landcover_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Parameters for the linear DN → reflectance rescaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectanceParams {
    /// Multiplicative rescaling factor
    pub scale: f64,
    /// Additive rescaling offset
    pub offset: f64,
    /// Express reflectance in percent (0-100) instead of a fraction (0-1)
    pub percent: bool,
    /// Inclusive DN range kept; anything outside becomes NaN
    pub valid_range: Option<(f64, f64)>,
    /// Clamp results to the physical range (off by default)
    pub clamp: bool,
    /// DN marking fill pixels; those become NaN
    pub fill_value: Option<f64>,
}

impl Default for ReflectanceParams {
    fn default() -> Self {
        Self {
            scale: 2.75e-5,
            offset: -0.2,
            percent: true,
            valid_range: Some((7273.0, 43636.0)),
            clamp: false,
            fill_value: Some(0.0),
        }
    }
}

impl ReflectanceParams {
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: self.scale.to_string(),
                reason: "must be finite and non-zero".into(),
            });
        }
        if !self.offset.is_finite() {
            return Err(Error::InvalidParameter {
                name: "offset",
                value: self.offset.to_string(),
                reason: "must be finite".into(),
            });
        }
        if let Some((lo, hi)) = self.valid_range {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(Error::InvalidParameter {
                    name: "valid_range",
                    value: format!("[{lo}, {hi}]"),
                    reason: "must be a finite [min, max] pair".into(),
                });
            }
        }
        Ok(())
    }

    /// Upper bound of the output range: 100 in percent mode, 1 otherwise.
    pub fn upper_bound(&self) -> f64 {
        if self.percent {
            100.0
        } else {
            1.0
        }
    }

    fn convert(&self, dn: f64) -> f64 {
        if !dn.is_finite() || self.fill_value.is_some_and(|fill| dn == fill) {
            return f64::NAN;
        }
        if self
            .valid_range
            .is_some_and(|(lo, hi)| !(lo..=hi).contains(&dn))
        {
            return f64::NAN;
        }
        let mut r = dn * self.scale + self.offset;
        if self.percent {
            r *= 100.0;
        }
        if self.clamp {
            r = r.clamp(0.0, self.upper_bound());
        }
        r
    }
}

/// Reflectance conversion algorithm
#[derive(Debug, Clone, Default)]
pub struct Reflectance;

impl Algorithm for Reflectance {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ReflectanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Reflectance"
    }

    fn description(&self) -> &'static str {
        "Rescale sensor digital numbers to surface reflectance"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        to_reflectance(&input, &params)
    }
}

/// Convert one band of digital numbers to reflectance.
///
/// NaN, nodata and fill cells become NaN; the output nodata is NaN.
pub fn to_reflectance(raster: &Raster<f64>, params: &ReflectanceParams) -> Result<Raster<f64>> {
    params.validate()?;

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let dn = unsafe { raster.get_unchecked(row, col) };
                if nodata.is_some_and(|nd| dn == nd) {
                    continue;
                }
                *out = params.convert(dn);
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Convert every band of a scene.
pub fn stack_to_reflectance(stack: &BandStack, params: &ReflectanceParams) -> Result<BandStack> {
    stack.try_map(|band| to_reflectance(band, params))
}
