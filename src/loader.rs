//! Turning encoded image bytes into a flat buffer of packed colors.

use image::{DynamicImage, GenericImageView, ImageFormat, imageops::FilterType};
use log::debug;

use crate::color::PackedColor;
use crate::error::{PaletteError, Result};

/// Width images are reduced to before quantization.
pub const DEFAULT_RESIZE_WIDTH: u32 = 500;

const SUPPORTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

/// Decoded pixels in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<PackedColor>,
}

/// Sniff the format from the leading bytes and decode.
pub fn decode(input: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(input)
        .map_err(|_| PaletteError::Decode("unrecognized image data".into()))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(PaletteError::UnsupportedFormat(format_name(format)));
    }
    let img = image::load_from_memory_with_format(input, format)?;
    let (w, h) = img.dimensions();
    debug!("decoded {} image {}x{}", format_name(format), w, h);
    Ok(img)
}

fn format_name(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| format!("{format:?}").to_lowercase())
}

/// Shrink to `width` keeping the aspect ratio. Narrower images are left
/// alone so no interpolated colors are introduced.
pub fn resize_to_width(img: DynamicImage, width: u32) -> DynamicImage {
    let (orig_w, orig_h) = img.dimensions();
    if width == 0 || orig_w <= width {
        return img;
    }
    let ratio = width as f32 / orig_w as f32;
    let h = ((orig_h as f32) * ratio).round().max(1.0) as u32;
    img.resize_exact(width, h, FilterType::Lanczos3)
}

/// Pack every pixel as an opaque color, discarding alpha.
pub fn pack_pixels(img: &DynamicImage) -> PixelBuffer {
    let (width, height) = img.dimensions();
    let raw = img.to_rgb8().into_raw();
    let pixels = raw
        .chunks_exact(3)
        .map(|c| PackedColor::from_rgb(c[0], c[1], c[2]))
        .collect();
    PixelBuffer { width, height, pixels }
}

/// Decode, optionally downsize, and pack.
pub fn load(input: &[u8], resize_width: Option<u32>) -> Result<PixelBuffer> {
    let mut img = decode(input)?;
    if let Some(width) = resize_width {
        img = resize_to_width(img, width);
    }
    Ok(pack_pixels(&img))
}
