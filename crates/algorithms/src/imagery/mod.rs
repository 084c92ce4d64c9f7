//! Imagery preprocessing
//!
//! - Reflectance: linear rescaling of digital numbers to surface reflectance

mod reflectance;

pub use reflectance::{stack_to_reflectance, to_reflectance, Reflectance, ReflectanceParams};
