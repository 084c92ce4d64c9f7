//! Categorical colour palettes for class maps.

use landcover_core::{Error, Result};
use std::fmt;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || Error::InvalidParameter {
            name: "palette",
            value: hex.to_string(),
            reason: "expected a colour as #rrggbb".into(),
        };
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Water, vegetation, built-up, bare soil.
pub const LANDCOVER_COLORS: [Rgb; 4] = [
    Rgb::new(31, 120, 180),
    Rgb::new(51, 160, 44),
    Rgb::new(227, 26, 28),
    Rgb::new(210, 180, 140),
];

/// One colour per class code; code `k` is drawn with colour `k - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalPalette {
    colors: Vec<Rgb>,
}

impl Default for CategoricalPalette {
    fn default() -> Self {
        Self {
            colors: LANDCOVER_COLORS.to_vec(),
        }
    }
}

impl CategoricalPalette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidParameter {
                name: "palette",
                value: String::new(),
                reason: "needs at least one colour".into(),
            });
        }
        Ok(Self { colors })
    }

    /// Palette from `#rrggbb` strings.
    pub fn from_hex<S: AsRef<str>>(colors: &[S]) -> Result<Self> {
        let colors = colors
            .iter()
            .map(|c| Rgb::from_hex(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(colors)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Colour of 1-based class `code`.
    pub fn color(&self, code: usize) -> Option<Rgb> {
        code.checked_sub(1).and_then(|i| self.colors.get(i)).copied()
    }

    /// Fail when `classes` codes cannot all be given a distinct colour.
    pub fn ensure_covers(&self, classes: usize) -> Result<()> {
        if classes > self.colors.len() {
            return Err(Error::InvalidParameter {
                name: "palette",
                value: format!("{} colours", self.colors.len()),
                reason: format!("{classes} classes need as many colours"),
            });
        }
        Ok(())
    }
}
