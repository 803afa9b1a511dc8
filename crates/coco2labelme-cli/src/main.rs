use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use coco2labelme::contour::DEFAULT_LEVEL;
use coco2labelme::{labelme, Converter, Document, Params, RuleTable};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::{prelude::*, ThreadPoolBuilder};

#[derive(Parser)]
#[command(name = "coco2labelme", version)]
#[command(about = "Convert scored COCO RLE mask detections into LabelMe polygon annotations")]
struct Cli {
    /// Path to detection results JSON (a list, or a dataset with `annotations`)
    #[arg(long)]
    detections: PathBuf,

    /// Path to a COCO template JSON providing images and categories
    #[arg(long)]
    template: PathBuf,

    /// Output directory for LabelMe JSON files
    #[arg(short, long)]
    output: PathBuf,

    /// Directory holding the source images; embeds them as imageData
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// JSON rule list for cross-label suppression (default: floor-plan rules)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Contour iso level, strictly between 0 and 1
    #[arg(long, default_value_t = DEFAULT_LEVEL)]
    level: f64,

    /// Connected components kept per detection mask
    #[arg(long, default_value_t = 1)]
    components: usize,

    /// Worker threads (0: one per core)
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    ensure!(cli.components > 0, "--components must be at least 1");
    ensure!(
        cli.level > 0.0 && cli.level < 1.0,
        "Contour level must be strictly between 0 and 1, got {}",
        cli.level
    );
    ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()?;

    let rules = match &cli.rules {
        Some(path) => RuleTable::from_json_file(path)
            .with_context(|| format!("Failed to load rules: {}", path.display()))?,
        None => RuleTable::floor_plan(),
    };
    info!("Using {} suppression rules", rules.len());
    let params = Params {
        level: cli.level,
        components_per_detection: cli.components,
        ..Params::with_rules(rules)
    };

    let converter = Converter::from_files(&cli.template, &cli.detections, params)
        .context("Failed to load inputs")?;
    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory: {}", cli.output.display()))?;

    let image_ids = converter.image_ids();
    let progress_bar = ProgressBar::new(image_ids.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let shapes = AtomicUsize::new(0);
    let dropped = AtomicUsize::new(0);
    image_ids
        .par_iter()
        .progress_with(progress_bar.clone())
        .try_for_each(|&id| -> Result<()> {
            let result = converter
                .convert_image(id)
                .with_context(|| format!("Failed to convert image {}", id))?;
            shapes.fetch_add(result.shapes.len(), Ordering::Relaxed);
            dropped.fetch_add(result.dropped, Ordering::Relaxed);

            let mut doc = Document::from_shapes(&result);
            if let Some(dir) = &cli.image_dir {
                doc = doc.embed_image(dir)?;
            }
            let path = cli.output.join(labelme::output_name(&result.image));
            doc.save(&path)
                .with_context(|| format!("Failed to write annotations: {}", path.display()))?;
            Ok(())
        })?;
    progress_bar.finish();

    let dropped = dropped.into_inner();
    if dropped > 0 {
        warn!("{} detections dropped on decode errors", dropped);
    }
    info!(
        "Wrote {} shapes for {} images to {}",
        shapes.into_inner(),
        image_ids.len(),
        cli.output.display()
    );
    Ok(())
}
