//! Map legend: class code, label and colour.

use crate::palette::CategoricalPalette;
use landcover_core::{Error, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub code: usize,
    pub label: String,
    /// `#rrggbb`
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    /// Legend for `labels` in code order (code = position + 1).
    ///
    /// Fails when the palette has fewer colours than labels.
    pub fn new<S: AsRef<str>>(labels: &[S], palette: &CategoricalPalette) -> Result<Self> {
        palette.ensure_covers(labels.len())?;
        let entries = labels
            .iter()
            .enumerate()
            .filter_map(|(i, label)| {
                palette.color(i + 1).map(|color| LegendEntry {
                    code: i + 1,
                    label: label.as_ref().to_string(),
                    color: color.to_string(),
                })
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
