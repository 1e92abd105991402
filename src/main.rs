use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};
use serde::Serialize;
use simplelog::{Config, WriteLogger};

use xtconv::{
    ConversionOptions, DeviceProfile, DitherMode, Orientation, SplitMode, container_extension,
    convert_batch,
};

#[derive(Parser)]
#[command(name = "xtconv", version, about = "Convert comics to the XTC e-reader format")]
struct Cli {
    /// Comic archives (.cbz/.zip) or directories of page images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (defaults to each input's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target device profile
    #[arg(long, value_enum, default_value = "x4")]
    device: DeviceProfile,

    /// How to divide tall pages in landscape orientation
    #[arg(long, value_enum, default_value = "none")]
    split: SplitMode,

    /// Dithering algorithm
    #[arg(long, value_enum, default_value = "floyd-steinberg")]
    dither: DitherMode,

    /// Contrast boost level, 0 disables
    #[arg(long, default_value_t = 0)]
    contrast: u8,

    /// Percent trimmed from the left and right edges
    #[arg(long, default_value_t = 0)]
    h_margin: u8,

    /// Percent trimmed from the top and bottom edges
    #[arg(long, default_value_t = 0)]
    v_margin: u8,

    /// Reading orientation of the device
    #[arg(long, value_enum, default_value = "portrait")]
    orientation: Orientation,

    /// Rotate landscape pages clockwise instead of counter-clockwise
    #[arg(long)]
    flip: bool,

    /// Print a JSON report to stdout instead of progress lines
    #[arg(long)]
    json: bool,

    /// Log file path
    #[arg(long, default_value = "xtconv.log")]
    log_file: PathBuf,
}

#[derive(Serialize)]
struct ReportEntry {
    source: String,
    output: Option<String>,
    pages: u32,
    bytes: usize,
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&cli.log_file)?,
    )?;
    info!("starting conversion of {} input(s)", cli.inputs.len());

    let options = ConversionOptions {
        device: cli.device,
        split_mode: cli.split,
        dither: cli.dither,
        contrast_level: cli.contrast,
        h_margin_pct: cli.h_margin,
        v_margin_pct: cli.v_margin,
        orientation: cli.orientation,
        landscape_flip_clockwise: cli.flip,
        show_progress_preview: false,
    }
    .clamped();

    let quiet = cli.json;
    let items = convert_batch(&cli.inputs, &options, |source, fraction, _| {
        if !quiet {
            eprint!("\r{source}: {:3.0}%", fraction * 100.0);
            let _ = std::io::stderr().flush();
        }
    });
    if !quiet {
        eprintln!();
    }

    let extension = container_extension(options.device);
    let mut report = Vec::with_capacity(items.len());
    let mut failures = 0usize;

    for (input, item) in cli.inputs.iter().zip(items) {
        match item.result {
            Ok(outcome) => {
                let out_dir = cli
                    .output
                    .clone()
                    .or_else(|| input.parent().map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("."));
                std::fs::create_dir_all(&out_dir)
                    .with_context(|| format!("creating {}", out_dir.display()))?;
                let out_path = out_dir.join(format!("{}.{extension}", outcome.name));
                std::fs::write(&out_path, &outcome.data)
                    .with_context(|| format!("writing {}", out_path.display()))?;

                if !quiet {
                    println!(
                        "{}: {} pages -> {}",
                        item.source,
                        outcome.page_count,
                        out_path.display()
                    );
                }
                report.push(ReportEntry {
                    source: item.source,
                    output: Some(out_path.display().to_string()),
                    pages: outcome.page_count,
                    bytes: outcome.data.len(),
                    error: None,
                });
            }
            Err(e) => {
                failures += 1;
                if !quiet {
                    eprintln!("{}: {e}", item.source);
                }
                report.push(ReportEntry {
                    source: item.source,
                    output: None,
                    pages: 0,
                    bytes: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if failures == report.len() {
        bail!("all {failures} input(s) failed to convert");
    }
    Ok(())
}
