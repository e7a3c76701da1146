use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use image_to_palette::HueDistance;
use image_to_palette::server::{ServerConfig, serve};

/// Palette extraction HTTP API.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Width images are reduced to before quantization (0 keeps the original)
    #[arg(long, env = "RESIZE_WIDTH", default_value_t = 500)]
    resize_width: u32,

    /// Largest accepted upload or fetched image, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Timeout for fetching remote images
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Fetch images directly, ignoring HTTP(S)_PROXY
    #[arg(long)]
    no_proxy: bool,

    /// Treat hues either side of 0° as neighbours when deduplicating
    #[arg(long)]
    circular_hue: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = ServerConfig {
        host: args.host,
        port: args.port,
        resize_width: args.resize_width,
        max_upload_bytes: args.max_upload_bytes,
        fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
        use_system_proxy: !args.no_proxy,
        hue_distance: if args.circular_hue { HueDistance::Circular } else { HueDistance::Linear },
    };
    serve(cfg).await
}
