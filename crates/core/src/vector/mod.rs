//! Vector data structures: polygons with attributes

use crate::crs::CRS;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Categorical label for this value, `None` for nulls.
    ///
    /// Whole floats print without a fractional part so a numeric class
    /// column read as `Float(2.0)` labels the same as `Int(2)`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Int(i) => Some(i.to_string()),
            AttributeValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                Some(format!("{}", *f as i64))
            }
            AttributeValue::Float(f) => Some(f.to_string()),
            AttributeValue::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_label() {
            Some(label) => write!(f, "{label}"),
            None => write!(f, "NULL"),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute.
    ///
    /// Falls back to a case-insensitive match since DBF field names are
    /// frequently upper-cased by desktop GIS.
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key).or_else(|| {
            self.properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }
}

/// Collection of features sharing one CRS
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// CRS of every geometry in the collection, when known
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Names of all attributes present on at least one feature, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .features
            .iter()
            .flat_map(|f| f.properties.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn labels_from_attribute_values() {
        assert_eq!(AttributeValue::Int(3).as_label().as_deref(), Some("3"));
        assert_eq!(AttributeValue::Float(2.0).as_label().as_deref(), Some("2"));
        assert_eq!(AttributeValue::Float(2.5).as_label().as_deref(), Some("2.5"));
        assert_eq!(
            AttributeValue::String(" water ".into()).as_label().as_deref(),
            Some("water")
        );
        assert_eq!(AttributeValue::String("  ".into()).as_label(), None);
        assert_eq!(AttributeValue::Null.as_label(), None);
    }

    #[test]
    fn property_lookup_is_case_insensitive_fallback() {
        let f = Feature::new(Geometry::Point(Point::new(0.0, 0.0)))
            .with_property("CLASS", AttributeValue::String("urban".into()));
        assert!(f.get_property("class").is_some());
        assert!(f.get_property("CLASS").is_some());
        assert!(f.get_property("label").is_none());
    }

    #[test]
    fn attribute_names_are_unique() {
        let mut fc = FeatureCollection::new();
        fc.push(
            Feature::new(Geometry::Point(Point::new(0.0, 0.0)))
                .with_property("class", AttributeValue::Int(1))
                .with_property("id", AttributeValue::Int(1)),
        );
        fc.push(
            Feature::new(Geometry::Point(Point::new(1.0, 1.0)))
                .with_property("class", AttributeValue::Int(2)),
        );
        assert_eq!(fc.attribute_names(), vec!["class".to_string(), "id".to_string()]);
    }
}
