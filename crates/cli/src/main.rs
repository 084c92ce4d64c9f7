//! landcover CLI - supervised land-cover classification of multispectral scenes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use landcover_algorithms::classification::ClassLevels;
use landcover_algorithms::pipeline::{run_pipeline, PipelineConfig, PipelineOutput};
use landcover_algorithms::scene::{discover_bands, DEFAULT_BAND_PATTERN};
use landcover_colormap::{render_map, save_png, CategoricalPalette, Legend};
use landcover_core::io::{read_features, read_geotiff, write_geotiff};
use landcover_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "landcover")]
#[command(author, version, about = "Supervised land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// List the band files of a scene directory
    Bands {
        /// Directory holding one raster per band
        dir: PathBuf,
        /// File-name regex with one capture group for the band number
        #[arg(long, default_value = DEFAULT_BAND_PATTERN)]
        pattern: String,
    },
    /// Classify a scene with a decision tree trained on labeled sites
    Classify(ClassifyArgs),
}

#[derive(clap::Args)]
struct ClassifyArgs {
    /// TOML file with pipeline settings; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding one raster per band
    #[arg(long)]
    bands_dir: Option<PathBuf>,
    /// Study-area polygon layer (.shp or .geojson)
    #[arg(long)]
    study_area: Option<PathBuf>,
    /// Training-site polygon layer (.shp or .geojson)
    #[arg(long)]
    training: Option<PathBuf>,
    /// Attribute of the training layer holding the class label
    #[arg(long)]
    attribute: Option<String>,
    /// Band numbers to use, e.g. 2,3,4,5 (default: all discovered)
    #[arg(long, value_delimiter = ',')]
    bands: Option<Vec<u32>>,
    /// File-name regex with one capture group for the band number
    #[arg(long)]
    pattern: Option<String>,
    /// Maximum tree depth
    #[arg(long)]
    max_depth: Option<usize>,
    /// Output map (PNG with legend)
    #[arg(long, default_value = "landcover.png")]
    map: PathBuf,
    /// Also write the class-code raster as GeoTIFF
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write the legend as JSON
    #[arg(long)]
    legend: Option<PathBuf>,
    /// Also write the model summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Legend swatch size in pixels
    #[arg(long, default_value = "16")]
    swatch: u32,
}

impl ClassifyArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = &self.bands_dir {
            config.bands_dir = dir.clone();
        }
        if let Some(path) = &self.study_area {
            config.study_area = path.clone();
        }
        if let Some(path) = &self.training {
            config.training_sites = path.clone();
        }
        if let Some(attribute) = &self.attribute {
            config.class_attribute = attribute.clone();
        }
        if let Some(bands) = &self.bands {
            config.bands = bands.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.band_pattern = pattern.clone();
        }
        if let Some(depth) = self.max_depth {
            config.tree.max_depth = depth;
        }

        config.validate().context("Invalid classification settings")?;
        Ok(config)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path)
        .context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn print_report(out: &PipelineOutput) {
    println!("Training pixels:");
    for (class, count) in &out.training_counts {
        println!("  {:<16} {}", class, count);
    }

    let summary = &out.model_summary;
    println!(
        "\nDecision tree: depth {}, {} leaves",
        summary.depth, summary.leaves
    );
    println!("Feature importance:");
    for (band, importance) in &summary.feature_importance {
        println!("  {:<6} {:.4}", band, importance);
    }

    let total: usize = out.classified.class_counts().iter().map(|(_, n)| n).sum();
    println!("\nClassified cells:");
    for (code, (class, count)) in out.classified.class_counts().iter().enumerate() {
        let pct = if total > 0 {
            100.0 * *count as f64 / total as f64
        } else {
            0.0
        };
        println!("  {} {:<16} {} ({:.1}%)", code + 1, class, count, pct);
    }
}

/// Palette from the config, checked against the training labels before any
/// raster is read.
fn prepare_palette(config: &PipelineConfig) -> Result<CategoricalPalette> {
    let palette = match &config.palette {
        Some(colors) => CategoricalPalette::from_hex(colors.as_slice()).context("Invalid palette")?,
        None => CategoricalPalette::default(),
    };
    let sites = read_features(&config.training_sites).with_context(|| {
        format!("Failed to read training sites {}", config.training_sites.display())
    })?;
    let levels = ClassLevels::from_features(&sites, &config.class_attribute)
        .context("Invalid training labels")?;
    palette
        .ensure_covers(levels.len())
        .context("Palette cannot cover every class")?;
    Ok(palette)
}

fn classify(args: ClassifyArgs) -> Result<()> {
    let config = args.pipeline_config()?;
    let palette = prepare_palette(&config)?;

    let start = Instant::now();
    let pb = spinner("Classifying scene...");
    let out = run_pipeline(&config);
    pb.finish_and_clear();
    let out = out.context("Classification failed")?;
    let elapsed = start.elapsed();

    print_report(&out);

    let legend = Legend::new(out.classified.levels.names(), &palette)
        .context("Palette cannot cover every class")?;
    let pb = spinner("Rendering map...");
    let img = render_map(&out.classified.raster, &palette, &legend, args.swatch)
        .context("Failed to render map")?;
    save_png(&args.map, &img).context("Failed to write map")?;
    pb.finish_and_clear();
    done("Map", &args.map, elapsed);

    if let Some(path) = &args.output {
        write_result(&out.classified.raster, path)?;
        println!("Classified raster saved to: {}", path.display());
    }
    if let Some(path) = &args.legend {
        legend.write_json(path).context("Failed to write legend")?;
        println!("Legend saved to: {}", path.display());
    }
    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&out.model_summary)
            .context("Failed to serialise model summary")?;
        std::fs::write(path, json).context("Failed to write model summary")?;
        println!("Model summary saved to: {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Bands ────────────────────────────────────────────────────
        Commands::Bands { dir, pattern } => {
            let files = discover_bands(&dir, &pattern)
                .with_context(|| format!("No band files in {}", dir.display()))?;
            println!("Scene: {}", dir.display());
            for file in &files {
                println!("  B{:<3} {}", file.number, file.path.display());
            }
            println!("{} bands", files.len());
        }

        // ── Classify ─────────────────────────────────────────────────
        Commands::Classify(args) => classify(args)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("run.toml");
        std::fs::write(
            &config,
            "bands_dir = \"scene\"\nstudy_area = \"area.shp\"\ntraining_sites = \"sites.shp\"\nclass_attribute = \"type\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "landcover",
            "classify",
            "--config",
            config.to_str().unwrap(),
            "--attribute",
            "landcover",
            "--bands",
            "2,3,4,5",
            "--max-depth",
            "10",
        ])
        .unwrap();
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        let merged = args.pipeline_config().unwrap();
        assert_eq!(merged.bands_dir, PathBuf::from("scene"));
        assert_eq!(merged.class_attribute, "landcover");
        assert_eq!(merged.bands, vec![2, 3, 4, 5]);
        assert_eq!(merged.tree.max_depth, 10);
        assert_eq!(args.map, PathBuf::from("landcover.png"));
    }

    #[test]
    fn short_palette_fails_before_the_scene_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let sites = dir.path().join("sites.geojson");
        let feature = |class: &str, x: f64| {
            format!(
                r#"{{"type": "Feature", "properties": {{"class": "{class}"}},
                "geometry": {{"type": "Point", "coordinates": [{x}, 4474500.0]}}}}"#
            )
        };
        std::fs::write(
            &sites,
            format!(
                r#"{{"type": "FeatureCollection", "features": [{}, {}, {}]}}"#,
                feature("water", 440000.0),
                feature("forest", 440300.0),
                feature("urban", 440600.0)
            ),
        )
        .unwrap();

        let mut config = PipelineConfig {
            bands_dir: dir.path().join("missing-scene"),
            training_sites: sites,
            palette: Some(vec!["#0000ff".into(), "#00ff00".into()]),
            ..Default::default()
        };
        let err = prepare_palette(&config).unwrap_err();
        assert!(format!("{err:#}").contains("Palette cannot cover every class"));

        config.palette = None;
        assert_eq!(prepare_palette(&config).unwrap().len(), 4);
    }

    #[test]
    fn classify_without_inputs_is_rejected() {
        let cli = Cli::try_parse_from(["landcover", "classify"]).unwrap();
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert!(args.pipeline_config().is_err());
    }
}
