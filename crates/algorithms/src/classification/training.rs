//! Training samples: pixel values extracted under labeled site polygons
//!
//! Every cell whose centre falls inside a training polygon becomes one
//! sample carrying that polygon's class label. Polygons too small to contain
//! a cell centre contribute the single cell under their centroid.

use crate::clip::covering_window;
use crate::scene::BandStack;
use geo::{Centroid, Contains, Geometry, Point};
use landcover_core::{Error, FeatureCollection, Result};
use linfa::Dataset;
use ndarray::{Array1, Array2};
use tracing::warn;

/// Sorted, de-duplicated class names.
///
/// The class code of a level is its 1-based position, so codes written to a
/// classified raster never collide with a zero fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLevels {
    names: Vec<String>,
}

impl ClassLevels {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Levels of `attribute` across all features.
    ///
    /// Fails when a feature lacks the attribute or holds a null.
    pub fn from_features(features: &FeatureCollection, attribute: &str) -> Result<Self> {
        let labels = features
            .iter()
            .enumerate()
            .map(|(index, f)| feature_label(f, index, attribute))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(labels))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 1-based code of `name`.
    pub fn code_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok().map(|i| i + 1)
    }

    /// Name of 1-based `code`.
    pub fn name_of(&self, code: usize) -> Option<&str> {
        code.checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// `(code, name)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i + 1, n.as_str()))
    }
}

fn feature_label(
    feature: &landcover_core::Feature,
    index: usize,
    attribute: &str,
) -> Result<String> {
    feature
        .get_property(attribute)
        .and_then(|v| v.as_label())
        .ok_or_else(|| Error::InvalidParameter {
            name: "class_attribute",
            value: attribute.to_string(),
            reason: format!(
                "training feature {} has no value for it",
                feature.id.clone().unwrap_or_else(|| index.to_string())
            ),
        })
}

/// One extracted pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Index of the training feature the pixel came from
    pub site: usize,
    /// 1-based class code
    pub class: usize,
    /// Band values, in stack order
    pub values: Vec<f64>,
}

/// Extracted samples joined with their class labels.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub levels: ClassLevels,
    pub samples: Vec<Sample>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per level, in code order (zero counts included).
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.levels.len()];
        for s in &self.samples {
            counts[s.class - 1] += 1;
        }
        self.levels
            .names()
            .iter()
            .cloned()
            .zip(counts)
            .collect()
    }

    /// Number of levels with at least one sample.
    pub fn observed_classes(&self) -> usize {
        self.class_counts().iter().filter(|(_, n)| *n > 0).count()
    }

    /// Samples x bands feature matrix.
    pub fn records(&self) -> Array2<f64> {
        Array2::from_shape_fn(
            (self.samples.len(), self.feature_names.len()),
            |(i, j)| self.samples[i].values[j],
        )
    }

    /// Zero-based class indices, the label space the tree is fitted on.
    pub fn targets(&self) -> Array1<usize> {
        self.samples.iter().map(|s| s.class - 1).collect()
    }

    /// linfa dataset with named features.
    pub fn to_dataset(&self) -> Dataset<f64, usize, ndarray::Ix1> {
        Dataset::new(self.records(), self.targets()).with_feature_names(self.feature_names.clone())
    }
}

/// Extract band values under every training polygon.
///
/// Samples with any non-finite band (masked or fill cells) are dropped.
/// Features without geometry or outside the scene are skipped with a warning.
pub fn extract_training_samples(
    stack: &BandStack,
    sites: &FeatureCollection,
    attribute: &str,
) -> Result<TrainingSet> {
    let levels = ClassLevels::from_features(sites, attribute)?;
    let template = stack.template();
    let mut buf = vec![0.0; stack.len()];
    let mut samples = Vec::new();

    for (site, feature) in sites.iter().enumerate() {
        let label = feature_label(feature, site, attribute)?;
        let class = levels
            .code_of(&label)
            .ok_or_else(|| Error::Algorithm(format!("label {label} missing from class levels")))?;

        let Some(geom) = feature.geometry.as_ref() else {
            warn!(site, "training feature has no geometry, skipped");
            continue;
        };

        let mut cells = cells_inside(stack, geom);
        if cells.is_empty() {
            if let Some(cell) = geom.centroid().and_then(|c| template.cell_at(c.x(), c.y())) {
                cells.push(cell);
            }
        }
        if cells.is_empty() {
            warn!(site, label = %label, "training feature does not overlap the scene, skipped");
            continue;
        }

        for (row, col) in cells {
            if stack.pixel(row, col, &mut buf) {
                samples.push(Sample {
                    site,
                    class,
                    values: buf.clone(),
                });
            }
        }
    }

    Ok(TrainingSet {
        feature_names: stack.feature_names(),
        levels,
        samples,
    })
}

fn cells_inside(stack: &BandStack, geom: &Geometry<f64>) -> Vec<(usize, usize)> {
    let template = stack.template();
    let Some((row0, col0, rows, cols)) = covering_window(template, geom) else {
        return Vec::new();
    };

    let mut cells = Vec::new();
    for row in row0..row0 + rows {
        for col in col0..col0 + cols {
            let (x, y) = template.pixel_to_geo(col, row);
            if geom.contains(&Point::new(x, y)) {
                cells.push((row, col));
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Band;
    use geo::polygon;
    use landcover_core::raster::Raster;
    use landcover_core::{AttributeValue, Feature, GeoTransform};

    /// 10x10 grid, 10 m cells, origin (0, 100). Band 2 = col, band 3 = row.
    fn stack() -> BandStack {
        let mut b2 = Raster::new(10, 10);
        let mut b3 = Raster::new(10, 10);
        for r in 0..10 {
            for c in 0..10 {
                b2.set(r, c, c as f64).unwrap();
                b3.set(r, c, r as f64).unwrap();
            }
        }
        for b in [&mut b2, &mut b3] {
            b.set_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        }
        BandStack::new(vec![
            Band { number: 2, raster: b2 },
            Band { number: 3, raster: b3 },
        ])
        .unwrap()
    }

    fn site(x0: f64, y0: f64, x1: f64, y1: f64, class: &str) -> Feature {
        Feature::new(Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]))
        .with_property("class", AttributeValue::String(class.into()))
    }

    #[test]
    fn levels_are_sorted_and_coded_from_one() {
        let levels = ClassLevels::new(["water", "forest", "urban", "forest"]);
        assert_eq!(levels.names(), &["forest", "urban", "water"]);
        assert_eq!(levels.code_of("forest"), Some(1));
        assert_eq!(levels.code_of("water"), Some(3));
        assert_eq!(levels.code_of("bare"), None);
        assert_eq!(levels.name_of(2), Some("urban"));
        assert_eq!(levels.name_of(0), None);
        assert_eq!(levels.name_of(4), None);
    }

    #[test]
    fn extraction_joins_labels_to_pixels() {
        let mut sites = FeatureCollection::new();
        // 2x2 cells in the top-left corner
        sites.push(site(0.0, 80.0, 20.0, 100.0, "water"));
        // 3x1 cells along the bottom row
        sites.push(site(50.0, 0.0, 80.0, 10.0, "urban"));

        let ts = extract_training_samples(&stack(), &sites, "class").unwrap();
        assert_eq!(ts.feature_names, vec!["B2", "B3"]);
        assert_eq!(ts.len(), 7);
        assert_eq!(
            ts.class_counts(),
            vec![("urban".to_string(), 3), ("water".to_string(), 4)]
        );

        let urban: Vec<&Sample> = ts.samples.iter().filter(|s| s.class == 1).collect();
        assert!(urban.iter().all(|s| s.values[1] == 9.0 && s.site == 1));

        let records = ts.records();
        assert_eq!(records.dim(), (7, 2));
        let targets = ts.targets();
        assert!(targets.iter().all(|&t| t < 2));
    }

    #[test]
    fn tiny_polygon_falls_back_to_centroid_cell() {
        let mut sites = FeatureCollection::new();
        sites.push(site(41.0, 51.0, 43.0, 53.0, "bare"));
        let ts = extract_training_samples(&stack(), &sites, "class").unwrap();
        assert_eq!(ts.len(), 1);
        assert_eq!(ts.samples[0].values, vec![4.0, 4.0]);
    }

    #[test]
    fn masked_pixels_are_dropped() {
        let mut s = stack();
        let mut bands: Vec<Band> = s.bands().to_vec();
        bands[0].raster.set(0, 0, f64::NAN).unwrap();
        s = BandStack::new(bands).unwrap();

        let mut sites = FeatureCollection::new();
        sites.push(site(0.0, 80.0, 20.0, 100.0, "water"));
        let ts = extract_training_samples(&s, &sites, "class").unwrap();
        assert_eq!(ts.len(), 3);
    }

    #[test]
    fn missing_attribute_is_an_error() {
        let mut sites = FeatureCollection::new();
        sites.push(site(0.0, 80.0, 20.0, 100.0, "water"));
        let err = extract_training_samples(&stack(), &sites, "landcover").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "class_attribute", .. }));
    }

    #[test]
    fn sites_outside_scene_are_skipped() {
        let mut sites = FeatureCollection::new();
        sites.push(site(500.0, 500.0, 520.0, 520.0, "water"));
        sites.push(site(0.0, 80.0, 20.0, 100.0, "forest"));
        let ts = extract_training_samples(&stack(), &sites, "class").unwrap();
        assert_eq!(ts.len(), 4);
        assert_eq!(ts.observed_classes(), 1);
        assert_eq!(ts.levels.len(), 2);
    }
}
