use wasm_bindgen::prelude::*;
use js_sys::{Array, Object, Reflect};
use log::debug;

pub mod color;
pub mod diversify;
pub mod error;
pub mod hct;
pub mod loader;
pub mod quantize;
#[cfg(feature = "server")]
pub mod server;

pub use color::PackedColor;
pub use diversify::{HueDistance, PaletteEntry, diversify, ensure_palette_size};
pub use error::{PaletteError, Result};
pub use hct::Hct;
pub use loader::{DEFAULT_RESIZE_WIDTH, PixelBuffer};
pub use quantize::{POOL_SIZE, QuantizeMethod, QuantizedEntry, quantize};

pub const MIN_COLORS: u32 = 1;
pub const MAX_COLORS: u32 = 100;
pub const DEFAULT_NUM_COLORS: u32 = 16;

/// Requested palette length, always within `MIN_COLORS..=MAX_COLORS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumColors(u32);

impl NumColors {
    pub fn new(n: u32) -> Result<Self> {
        if (MIN_COLORS..=MAX_COLORS).contains(&n) {
            Ok(NumColors(n))
        } else {
            Err(PaletteError::Validation(
                "Invalid number of colors. Must be between 1 and 100.".into(),
            ))
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl Default for NumColors {
    fn default() -> Self {
        NumColors(DEFAULT_NUM_COLORS)
    }
}

impl TryFrom<i64> for NumColors {
    type Error = PaletteError;

    fn try_from(n: i64) -> Result<Self> {
        let n = u32::try_from(n).unwrap_or(0);
        NumColors::new(n)
    }
}

/// Knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PaletteOptions {
    /// Width images are reduced to before quantization; `None` keeps them as is.
    pub resize_width: Option<u32>,
    /// Size of the quantized candidate pool.
    pub pool_size: usize,
    pub method: QuantizeMethod,
    pub hue_distance: HueDistance,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            resize_width: Some(DEFAULT_RESIZE_WIDTH),
            pool_size: POOL_SIZE,
            method: QuantizeMethod::default(),
            hue_distance: HueDistance::default(),
        }
    }
}

/// Build a palette of exactly `num_colors` entries from packed pixels.
///
/// Steps performed:
/// 1. Quantize into a pool of at most `options.pool_size` ranked colors.
/// 2. Walk the pool by population, keeping colors whose hue is distinct.
/// 3. Pad by cycling the kept colors when fewer than requested survive.
pub fn generate_palette(
    pixels: &[PackedColor],
    num_colors: NumColors,
    options: &PaletteOptions,
) -> Result<Vec<PaletteEntry>> {
    let ranked = quantize(pixels, options.pool_size, options.method)?;
    let accepted = diversify(&ranked, num_colors.get(), options.hue_distance);
    debug!(
        "palette: {} candidates, {} distinct hues, {} requested",
        ranked.len(),
        accepted.len(),
        num_colors.get()
    );
    ensure_palette_size(accepted, num_colors.get())
}

/// Decode encoded image bytes and build a palette from them.
pub fn extract_palette_bytes(
    input: &[u8],
    num_colors: NumColors,
    options: &PaletteOptions,
) -> Result<Vec<PaletteEntry>> {
    let buffer = loader::load(input, options.resize_width)?;
    generate_palette(&buffer.pixels, num_colors, options)
}

/// Extract a palette in the browser.
///
/// Returns an array of `{ hex, red, green, blue, population }` objects.
#[wasm_bindgen]
pub fn extract_palette(input: Vec<u8>, num_colors: u32) -> std::result::Result<Array, JsValue> {
    let num_colors = NumColors::new(num_colors).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let palette = extract_palette_bytes(&input, num_colors, &PaletteOptions::default())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let out = Array::new();
    for entry in palette {
        let obj = Object::new();
        Reflect::set(&obj, &JsValue::from_str("hex"), &JsValue::from_str(&entry.hex))?;
        Reflect::set(&obj, &JsValue::from_str("red"), &JsValue::from(entry.red))?;
        Reflect::set(&obj, &JsValue::from_str("green"), &JsValue::from(entry.green))?;
        Reflect::set(&obj, &JsValue::from_str("blue"), &JsValue::from(entry.blue))?;
        Reflect::set(&obj, &JsValue::from_str("population"), &JsValue::from(entry.population))?;
        out.push(&obj);
    }
    Ok(out)
}
