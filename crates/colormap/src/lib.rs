//! # landcover colormap
//!
//! Thematic rendering of classified rasters: a categorical palette, a
//! legend and PNG output. The main entry point is [`render_map`], which
//! draws a class-code raster with a swatch column for its legend.
//!
//! ## Usage
//!
//! ```ignore
//! use landcover_colormap::{render_map, save_png, CategoricalPalette, Legend};
//!
//! let palette = CategoricalPalette::default();
//! let legend = Legend::new(classified.levels.names(), &palette)?;
//! let img = render_map(&classified.raster, &palette, &legend, 16)?;
//! save_png("map.png", &img)?;
//! ```

mod legend;
mod palette;
mod render;

pub use legend::{Legend, LegendEntry};
pub use palette::{CategoricalPalette, Rgb, LANDCOVER_COLORS};
pub use render::{classified_to_rgba, render_legend_swatches, render_map, save_png, write_png};
