use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::DynamicImage;
use log::{info, warn};
use printroll_core::{
    estimate_print, load_layout_config, plan_layout, resolve_layout_config, CoreError, LayoutConfig,
    LayoutOverrides, LayoutPlan, PrintEstimate,
};
use printroll_image::{image_size, pack, write_canvas, OutputFormat};
use printroll_input::{collect_photos, LoadedPhoto};

#[derive(Parser, Debug)]
#[command(name = "printroll", version, about = "Lay out photos in rows on a print roll")]
struct Cli {
    /// Only log warnings and errors.
    #[arg(long, short = 'q', global = true, default_value_t = false)]
    quiet: bool,
    #[command(subcommand)]
    command: TopLevelCommand,
}

#[derive(Subcommand, Debug)]
enum TopLevelCommand {
    /// Render the collage and write it to the output file.
    Compose(ComposeArgs),
    /// Print the computed layout as JSON without writing an image.
    Plan(LayoutArgs),
}

#[derive(Args, Debug)]
struct LayoutArgs {
    #[arg(long, short = 'i', default_value = ".")]
    input: PathBuf,
    /// Also pick up photos in subdirectories.
    #[arg(long, short = 'r', default_value_t = false)]
    recursive: bool,
    /// JSON layout config; flags given on the command line take precedence.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    #[arg(long)]
    roll_width_cm: Option<f64>,
    /// Canvas width in pixels, instead of deriving it from the roll width.
    #[arg(long)]
    canvas_width_px: Option<u32>,
    #[arg(long)]
    dpi: Option<u32>,
    #[arg(long, short = 'p')]
    padding: Option<u32>,
    /// Longest side of each photo after resizing, in pixels.
    #[arg(long, short = 's')]
    photo_size: Option<u32>,
    #[arg(long)]
    rate_per_meter: Option<f64>,
}

#[derive(Args, Debug)]
struct ComposeArgs {
    #[command(flatten)]
    layout: LayoutArgs,
    #[arg(long, short = 'o', default_value = "photo_collage.jpg")]
    output: PathBuf,
    /// JPEG quality, 1-100.
    #[arg(long)]
    quality: Option<u8>,
    /// Print a JSON run report to stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let json_output = match &cli.command {
        TopLevelCommand::Compose(args) => args.json,
        TopLevelCommand::Plan(_) => true,
    };
    let outcome = match &cli.command {
        TopLevelCommand::Compose(args) => run_compose(args),
        TopLevelCommand::Plan(args) => run_plan(args),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<CoreError>() {
            Some(core) if core.is_empty_outcome() => {
                report_empty_outcome(core, json_output)?;
                Ok(())
            }
            _ => Err(err),
        },
    }
}

fn init_logging(quiet: bool) {
    let level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn report_empty_outcome(err: &CoreError, json_output: bool) -> Result<()> {
    match err {
        CoreError::InputNotFound(dir) => {
            warn!("Please create folder '{}' and add your photos!", dir.display())
        }
        CoreError::EmptyInput(dir) => warn!("No photos found in '{}'!", dir.display()),
        other => warn!("{}", other),
    }
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "error": err.as_error_info() }))?
        );
    }
    Ok(())
}

fn resolve_config(args: &LayoutArgs, quality: Option<u8>) -> Result<LayoutConfig> {
    let base = match &args.config {
        Some(path) => load_layout_config(path)
            .with_context(|| format!("reading layout config {}", path.display()))?,
        None => LayoutConfig::default(),
    };
    let cfg = resolve_layout_config(
        base,
        LayoutOverrides {
            roll_width_cm: args.roll_width_cm,
            canvas_width_px: args.canvas_width_px,
            dpi: args.dpi,
            padding: args.padding,
            target_photo_size: args.photo_size,
            quality,
            rate_per_meter: args.rate_per_meter,
        },
    );
    cfg.validate()?;
    Ok(cfg)
}

fn log_run_header(cfg: &LayoutConfig) {
    match cfg.canvas_width_px {
        Some(px) => info!("Canvas width: {}px at {} DPI", px, cfg.dpi),
        None => info!(
            "Roll width: {}cm ({}px at {} DPI)",
            cfg.roll_width_cm,
            cfg.canvas_width(),
            cfg.dpi
        ),
    }
    info!("Photo size: ~{}px", cfg.target_photo_size);
}

fn log_estimate(plan: &LayoutPlan, estimate: &PrintEstimate) {
    info!("Total canvas size: {}px x {}px", plan.canvas_width, plan.total_height);
    info!("Estimated height: {:.1} cm", estimate.length_cm);
    info!("Estimated cost: ${:.2}", estimate.cost);
}

/// JFIF density for the output file. `validate` already bounds the dpi.
fn output_density(cfg: &LayoutConfig) -> Result<u16> {
    u16::try_from(cfg.dpi).with_context(|| format!("dpi {} does not fit the JFIF density field", cfg.dpi))
}

fn run_compose(args: &ComposeArgs) -> Result<()> {
    let cfg = resolve_config(&args.layout, args.quality)?;
    // Reject an unusable output path before decoding anything.
    OutputFormat::from_path(&args.output)?;
    let density = output_density(&cfg)?;
    log_run_header(&cfg);

    let params = cfg.layout_params();
    let photos = collect_photos(&args.layout.input, args.layout.recursive, &params)?;
    let (inputs, images): (Vec<InputSummary>, Vec<DynamicImage>) = photos
        .into_iter()
        .map(|photo| (InputSummary::from(&photo), photo.image))
        .unzip();

    let composition =
        pack(&images, &params).ok_or_else(|| CoreError::EmptyInput(args.layout.input.clone()))?;
    drop(images);
    let plan = &composition.plan;
    let estimate = estimate_print(plan.total_height, cfg.dpi, cfg.rate_per_meter);
    log_estimate(plan, &estimate);

    write_canvas(&composition.canvas, &args.output, cfg.quality, density)
        .with_context(|| format!("saving collage to {}", args.output.display()))?;
    info!("Collage saved as '{}'", args.output.display());
    info!("Ready to print!");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run_report(&inputs, plan, &estimate, Some(&args.output)))?
        );
    }
    Ok(())
}

fn plan_report(args: &LayoutArgs) -> Result<serde_json::Value> {
    let cfg = resolve_config(args, None)?;
    log_run_header(&cfg);

    let params = cfg.layout_params();
    let photos = collect_photos(&args.input, args.recursive, &params)?;
    let inputs: Vec<InputSummary> = photos.iter().map(InputSummary::from).collect();
    let sizes: Vec<_> = photos.iter().map(|photo| image_size(&photo.image)).collect();
    drop(photos);

    let plan = plan_layout(&sizes, &params).ok_or_else(|| CoreError::EmptyInput(args.input.clone()))?;
    info!("Arranging {} photos, ~{} per row", sizes.len(), plan.photos_per_row);
    let estimate = estimate_print(plan.total_height, cfg.dpi, cfg.rate_per_meter);
    log_estimate(&plan, &estimate);

    let mut report = run_report(&inputs, &plan, &estimate, None);
    report["config"] = serde_json::to_value(&cfg)?;
    report["plan"] = serde_json::to_value(&plan)?;
    Ok(report)
}

fn run_plan(args: &LayoutArgs) -> Result<()> {
    let report = plan_report(args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

struct InputSummary {
    path: PathBuf,
    original: (u32, u32),
    resized: (u32, u32),
}

impl From<&LoadedPhoto> for InputSummary {
    fn from(photo: &LoadedPhoto) -> Self {
        let size = image_size(&photo.image);
        Self {
            path: photo.path.clone(),
            original: (photo.original.width, photo.original.height),
            resized: (size.width, size.height),
        }
    }
}

fn run_report(
    inputs: &[InputSummary],
    plan: &LayoutPlan,
    estimate: &PrintEstimate,
    output: Option<&Path>,
) -> serde_json::Value {
    let photos: Vec<serde_json::Value> = plan
        .placements
        .iter()
        .map(|placement| {
            let input = &inputs[placement.index];
            serde_json::json!({
                "input": input.path,
                "originalWidth": input.original.0,
                "originalHeight": input.original.1,
                "width": input.resized.0,
                "height": input.resized.1,
                "row": placement.row,
                "x": placement.x,
                "y": placement.y,
            })
        })
        .collect();
    serde_json::json!({
        "output": output,
        "canvasWidth": plan.canvas_width,
        "canvasHeight": plan.total_height,
        "rows": plan.rows.len(),
        "photosPerRow": plan.photos_per_row,
        "estimate": estimate,
        "photos": photos,
    })
}
