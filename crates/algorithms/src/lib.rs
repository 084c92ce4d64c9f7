//! # landcover algorithms
//!
//! Scene preparation and supervised classification for landcover.
//!
//! ## Modules
//!
//! - **scene**: band discovery and multi-band stacking
//! - **clip**: crop and mask to a study-area polygon
//! - **imagery**: digital number to reflectance conversion
//! - **classification**: training extraction, decision-tree fit and prediction
//! - **pipeline**: the end-to-end workflow

pub(crate) mod maybe_rayon;

pub mod scene;
pub mod clip;
pub mod imagery;
pub mod classification;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::scene::{
        discover_bands, load_band_stack, Band, BandFile, BandStack, DEFAULT_BAND_PATTERN,
    };
    pub use crate::clip::{
        clip_to_study_area, crop_to_geometry, mask_to_geometry, study_area_geometry,
    };
    pub use crate::imagery::{stack_to_reflectance, to_reflectance, Reflectance, ReflectanceParams};
    pub use crate::classification::{
        extract_training_samples, ClassLevels, ClassifiedRaster, LandCoverModel, ModelSummary,
        TrainingSet, TreeParams,
    };
    pub use crate::pipeline::{classify_scene, run_pipeline, PipelineConfig, PipelineOutput};
    pub use landcover_core::prelude::*;
}
