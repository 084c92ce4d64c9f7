//! End-to-end supervised classification run
//!
//! load bands → reproject vectors → crop/mask → reflectance →
//! extract training pixels → fit tree → classify scene

use crate::classification::{
    extract_training_samples, ClassifiedRaster, LandCoverModel, ModelSummary, TreeParams,
};
use crate::clip::{clip_to_study_area, study_area_geometry};
use crate::imagery::{stack_to_reflectance, ReflectanceParams};
use crate::scene::{load_band_stack, BandStack, DEFAULT_BAND_PATTERN};
use landcover_core::crs::reproject::reproject_features;
use landcover_core::io::read_features;
use landcover_core::{Error, FeatureCollection, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Inputs and parameters of one classification run.
///
/// Every field has a default so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding one raster per band
    pub bands_dir: PathBuf,
    /// File-name regex with one capture group for the band number
    pub band_pattern: String,
    /// Band numbers to stack; all discovered bands when empty
    pub bands: Vec<u32>,
    /// Study-area polygon layer
    pub study_area: PathBuf,
    /// Labeled training-site polygon layer
    pub training_sites: PathBuf,
    /// Attribute of the training layer holding the class label
    pub class_attribute: String,
    pub reflectance: ReflectanceParams,
    pub tree: TreeParams,
    /// Map colours as `#rrggbb`, one per class in code order
    pub palette: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bands_dir: PathBuf::new(),
            band_pattern: DEFAULT_BAND_PATTERN.to_string(),
            bands: Vec::new(),
            study_area: PathBuf::new(),
            training_sites: PathBuf::new(),
            class_attribute: "class".to_string(),
            reflectance: ReflectanceParams::default(),
            tree: TreeParams::default(),
            palette: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::InvalidParameter {
            name: "config",
            value: "toml".into(),
            reason: e.to_string(),
        })
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check parameters and that every input path is set.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("bands_dir", &self.bands_dir),
            ("study_area", &self.study_area),
            ("training_sites", &self.training_sites),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidParameter {
                    name,
                    value: String::new(),
                    reason: "path is required".into(),
                });
            }
        }
        if self.class_attribute.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "class_attribute",
                value: self.class_attribute.clone(),
                reason: "must not be empty".into(),
            });
        }
        self.reflectance.validate()?;
        self.tree.validate()
    }

    fn band_selection(&self) -> Option<&[u32]> {
        (!self.bands.is_empty()).then_some(self.bands.as_slice())
    }
}

/// Result of a classification run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub classified: ClassifiedRaster,
    pub model: LandCoverModel,
    pub model_summary: ModelSummary,
    /// Training pixels per class, in code order
    pub training_counts: Vec<(String, usize)>,
    /// The clipped reflectance scene that was classified
    pub scene: BandStack,
}

/// Run the whole workflow from the files named in `config`.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;

    info!(dir = %config.bands_dir.display(), "loading bands");
    let stack = load_band_stack(&config.bands_dir, &config.band_pattern, config.band_selection())?;

    let study_area = read_features(&config.study_area)?;
    let sites = read_features(&config.training_sites)?;
    debug!(
        study_area = study_area.len(),
        training_sites = sites.len(),
        "vector layers read"
    );

    classify_scene(&stack, &study_area, &sites, config)
}

/// Run the workflow on an already loaded scene and vector layers.
pub fn classify_scene(
    stack: &BandStack,
    study_area: &FeatureCollection,
    sites: &FeatureCollection,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let (study_area, sites) = match stack.crs() {
        Some(crs) => {
            info!(crs = %crs, "reprojecting vector layers");
            (
                reproject_features(study_area, crs)?,
                reproject_features(sites, crs)?,
            )
        }
        None => {
            warn!("scene has no CRS; vector layers used as-is");
            (study_area.clone(), sites.clone())
        }
    };

    let area = study_area_geometry(&study_area)?;
    let clipped = clip_to_study_area(stack, &area)?;
    let (rows, cols) = clipped.shape();
    info!(rows, cols, valid = clipped.valid_count(), "scene clipped to study area");

    let scene = stack_to_reflectance(&clipped, &config.reflectance)?;
    debug!(percent = config.reflectance.percent, "reflectance computed");

    let training = extract_training_samples(&scene, &sites, &config.class_attribute)?;
    let training_counts = training.class_counts();
    for (class, count) in &training_counts {
        info!(class = %class, pixels = count, "training samples");
        if *count == 0 {
            warn!(class = %class, "class has no valid training pixels");
        }
    }

    let model = LandCoverModel::fit(&training, &config.tree)?;
    let model_summary = model.summary();
    info!(
        depth = model_summary.depth,
        leaves = model_summary.leaves,
        "decision tree fitted"
    );

    let classified = model.predict_raster(&scene)?;
    info!(classes = classified.codes().len(), "scene classified");

    Ok(PipelineOutput {
        classified,
        model,
        model_summary,
        training_counts,
        scene,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = PipelineConfig::from_toml_str(
            r#"
            bands_dir = "scene"
            study_area = "area.shp"
            training_sites = "sites.shp"
            class_attribute = "landcover"
            bands = [2, 3, 4, 5]

            [tree]
            max_depth = 8

            [reflectance]
            percent = false
            "#,
        )
        .unwrap();

        assert_eq!(config.bands, vec![2, 3, 4, 5]);
        assert_eq!(config.tree.max_depth, 8);
        assert_eq!(config.tree.min_samples_leaf, 7);
        assert!(!config.reflectance.percent);
        assert_eq!(config.reflectance.scale, 2.75e-5);
        assert_eq!(config.band_pattern, DEFAULT_BAND_PATTERN);
        assert!(config.palette.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_paths_fail_validation() {
        let config = PipelineConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "bands_dir", .. }));
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(PipelineConfig::from_toml_str("bands = \"all\"").is_err());
    }
}
