//! Decision-tree land-cover classifier
//!
//! CART with Gini impurity via `linfa-trees`. The tree is fitted on
//! zero-based class indices and every prediction is shifted back to the
//! 1-based codes of [`ClassLevels`].

use super::training::{ClassLevels, TrainingSet};
use crate::maybe_rayon::*;
use crate::scene::BandStack;
use landcover_core::raster::Raster;
use landcover_core::{Error, Result};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stopping rules for tree induction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Maximum depth of any node (root = 0)
    pub max_depth: usize,
    /// Minimum samples in a node before a split is attempted
    pub min_samples_split: usize,
    /// Minimum samples in any leaf
    pub min_samples_leaf: usize,
    /// Splits that improve impurity less than this are not made
    pub min_impurity_decrease: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 30,
            min_samples_split: 20,
            min_samples_leaf: 7,
            min_impurity_decrease: 0.01,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::InvalidParameter {
                name: "max_depth",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::InvalidParameter {
                name: "min_samples_leaf",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !(self.min_impurity_decrease.is_finite() && self.min_impurity_decrease > 0.0) {
            return Err(Error::InvalidParameter {
                name: "min_impurity_decrease",
                value: self.min_impurity_decrease.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        Ok(())
    }
}

/// Structure of a fitted tree.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub depth: usize,
    pub leaves: usize,
    pub classes: Vec<String>,
    /// `(feature name, importance)`, most important first
    pub feature_importance: Vec<(String, f64)>,
}

/// A fitted decision tree together with the label space it predicts into.
#[derive(Debug, Clone)]
pub struct LandCoverModel {
    tree: DecisionTree<f64, usize>,
    levels: ClassLevels,
    feature_names: Vec<String>,
}

impl LandCoverModel {
    /// Fit a tree on `training`.
    ///
    /// Fails without samples or when fewer than two classes were observed.
    pub fn fit(training: &TrainingSet, params: &TreeParams) -> Result<Self> {
        params.validate()?;
        if training.is_empty() {
            return Err(Error::Algorithm(
                "no training samples: no training site overlaps valid pixels".into(),
            ));
        }
        let observed = training.observed_classes();
        if observed < 2 {
            return Err(Error::Algorithm(format!(
                "decision tree needs at least 2 classes with samples, got {observed}"
            )));
        }

        let dataset = training.to_dataset();
        let tree = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(Some(params.max_depth))
            .min_weight_split(params.min_samples_split as f32)
            .min_weight_leaf(params.min_samples_leaf as f32)
            .min_impurity_decrease(params.min_impurity_decrease)
            .fit(&dataset)
            .map_err(|e| Error::Algorithm(format!("decision tree fit failed: {e}")))?;

        debug!(
            samples = training.len(),
            depth = tree.max_depth(),
            leaves = tree.num_leaves(),
            "decision tree fitted"
        );

        Ok(Self {
            tree,
            levels: training.levels.clone(),
            feature_names: training.feature_names.clone(),
        })
    }

    pub fn levels(&self) -> &ClassLevels {
        &self.levels
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// 1-based class codes for each row of `records` (samples x bands).
    pub fn predict_pixels(&self, records: &Array2<f64>) -> Result<Vec<usize>> {
        if records.ncols() != self.feature_names.len() {
            return Err(Error::SizeMismatch {
                er: records.nrows(),
                ec: self.feature_names.len(),
                ar: records.nrows(),
                ac: records.ncols(),
            });
        }
        if records.nrows() == 0 {
            return Ok(Vec::new());
        }
        Ok(self.tree.predict(records).iter().map(|&k| k + 1).collect())
    }

    /// Classify every pixel of `stack`.
    ///
    /// Pixels with any non-finite band stay NaN; all others receive a code
    /// in `1..=levels.len()`.
    pub fn predict_raster(&self, stack: &BandStack) -> Result<ClassifiedRaster> {
        if stack.feature_names() != self.feature_names {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: stack.feature_names().join(","),
                reason: format!("model was trained on {}", self.feature_names.join(",")),
            });
        }

        let (rows, cols) = stack.shape();
        let n_bands = stack.len();

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                let mut buf = vec![0.0; n_bands];
                let mut valid_cols = Vec::with_capacity(cols);
                let mut values = Vec::with_capacity(cols * n_bands);
                for col in 0..cols {
                    if stack.pixel(row, col, &mut buf) {
                        valid_cols.push(col);
                        values.extend_from_slice(&buf);
                    }
                }
                if valid_cols.is_empty() {
                    return row_data;
                }
                let records = Array2::from_shape_fn((valid_cols.len(), n_bands), |(i, j)| {
                    values[i * n_bands + j]
                });
                let predicted = self.tree.predict(&records);
                for (&col, &k) in valid_cols.iter().zip(predicted.iter()) {
                    row_data[col] = (k + 1) as f64;
                }
                row_data
            })
            .collect();

        let mut output = stack.template().with_same_meta::<f64>(rows, cols);
        output.set_nodata(Some(f64::NAN));
        *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(ClassifiedRaster {
            raster: output,
            levels: self.levels.clone(),
        })
    }

    pub fn summary(&self) -> ModelSummary {
        let mut feature_importance: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.tree.feature_importance())
            .collect();
        feature_importance.sort_by(|a, b| b.1.total_cmp(&a.1));

        ModelSummary {
            depth: self.tree.max_depth(),
            leaves: self.tree.num_leaves(),
            classes: self.levels.names().to_vec(),
            feature_importance,
        }
    }
}

/// Class-code raster and the levels its codes refer to.
#[derive(Debug, Clone)]
pub struct ClassifiedRaster {
    pub raster: Raster<f64>,
    pub levels: ClassLevels,
}

impl ClassifiedRaster {
    /// Cell count per level, in code order.
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.levels.len()];
        for &v in self.raster.data().iter() {
            if v.is_finite() && v >= 1.0 {
                if let Some(c) = counts.get_mut(v as usize - 1) {
                    *c += 1;
                }
            }
        }
        self.levels.names().iter().cloned().zip(counts).collect()
    }

    /// Distinct codes present in the raster, ascending.
    pub fn codes(&self) -> Vec<usize> {
        self.class_counts()
            .iter()
            .enumerate()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(i, _)| i + 1)
            .collect()
    }
}
