//! Supervised land-cover classification
//!
//! - **Training**: pixel extraction under labeled site polygons
//! - **Decision tree**: CART fit and per-pixel prediction

pub mod training;
mod tree;

pub use training::{extract_training_samples, ClassLevels, Sample, TrainingSet};
pub use tree::{ClassifiedRaster, LandCoverModel, ModelSummary, TreeParams};
