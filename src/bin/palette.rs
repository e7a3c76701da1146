use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use image_to_palette::{HueDistance, NumColors, PaletteOptions, QuantizeMethod, extract_palette_bytes};
use anyhow::Context;
use anyhow::Result;
use log::info;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    /// Variance-split buckets refined in RGB
    Bucket,
    /// k-means over every pixel in CIE Lab
    KmeansLab,
}

/// Extract a hue-diverse color palette from images.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Number of colors in each palette (1-100)
    #[arg(short = 'k', long, default_value_t = 16)]
    num_colors: u32,

    /// Width images are reduced to before quantization (0 keeps the original)
    #[arg(short = 'w', long, default_value_t = 500)]
    resize_width: u32,

    /// Quantization method
    #[arg(short, long, value_enum, default_value_t = Method::Bucket)]
    method: Method,

    /// Treat hues either side of 0° as neighbours when deduplicating
    #[arg(long)]
    circular_hue: bool,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    file: String,
    palette: &'a [image_to_palette::PaletteEntry],
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let num_colors = NumColors::new(args.num_colors)?;
    let options = PaletteOptions {
        resize_width: (args.resize_width > 0).then_some(args.resize_width),
        method: match args.method {
            Method::Bucket => QuantizeMethod::Bucket,
            Method::KmeansLab => QuantizeMethod::KMeansLab,
        },
        hue_distance: if args.circular_hue { HueDistance::Circular } else { HueDistance::Linear },
        ..PaletteOptions::default()
    };

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let palette = extract_palette_bytes(&bytes, num_colors, &options)
            .with_context(|| format!("palette extraction failed for {}", input.display()))?;
        info!("{}: {} colors", input.display(), palette.len());

        let out = Output { file: input.display().to_string(), palette: &palette };
        let json = if args.pretty {
            serde_json::to_string_pretty(&out)?
        } else {
            serde_json::to_string(&out)?
        };
        println!("{json}");
    }

    Ok(())
}
