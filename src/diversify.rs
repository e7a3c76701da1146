//! Hue-based selection from the quantized pool, and padding of the result
//! to the requested length.

use serde::Serialize;

use crate::color::PackedColor;
use crate::error::{PaletteError, Result};
use crate::hct::Hct;
use crate::quantize::QuantizedEntry;

/// Minimum hue separation, in degrees, between two accepted colors.
pub const HUE_THRESHOLD: f64 = 10.0;

/// How the distance between two hues is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HueDistance {
    /// Plain `|a - b|`. Hues either side of 0° look far apart.
    #[default]
    Linear,
    /// Shortest way around the circle.
    Circular,
}

impl HueDistance {
    pub fn between(self, a: f64, b: f64) -> f64 {
        let d = (a - b).abs();
        match self {
            HueDistance::Linear => d,
            HueDistance::Circular => d.min(360.0 - d),
        }
    }
}

/// One color of the final palette.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaletteEntry {
    pub hex: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub hue: f64,
    pub chroma: f64,
    pub tone: f64,
    pub population: u32,
}

impl PaletteEntry {
    /// Build from a perceptual color, converting it back to sRGB.
    pub fn from_hct(hct: Hct, population: u32) -> Self {
        let rgb = hct.to_packed();
        Self {
            hex: rgb.to_hex(),
            red: rgb.red(),
            green: rgb.green(),
            blue: rgb.blue(),
            hue: hct.hue,
            chroma: hct.chroma,
            tone: hct.tone,
            population,
        }
    }

    pub fn color(&self) -> PackedColor {
        PackedColor::from_rgb(self.red, self.green, self.blue)
    }
}

/// Walk `ranked` in order and keep each entry whose hue is at least
/// [`HUE_THRESHOLD`] from every hue kept so far, stopping at `limit`.
pub fn diversify(ranked: &[QuantizedEntry], limit: usize, distance: HueDistance) -> Vec<PaletteEntry> {
    let mut accepted: Vec<PaletteEntry> = Vec::with_capacity(limit);
    let mut seen_hues: Vec<f64> = Vec::with_capacity(limit);

    for entry in ranked {
        if accepted.len() >= limit {
            break;
        }
        let hct = Hct::from_packed(entry.color);
        if seen_hues.iter().any(|&h| distance.between(h, hct.hue) < HUE_THRESHOLD) {
            continue;
        }
        seen_hues.push(hct.hue);
        accepted.push(PaletteEntry::from_hct(hct, entry.population));
    }

    accepted
}

/// Return exactly `target` entries: truncate, or pad by cycling through
/// `accepted` in order.
pub fn ensure_palette_size(accepted: Vec<PaletteEntry>, target: usize) -> Result<Vec<PaletteEntry>> {
    if accepted.is_empty() {
        return Err(PaletteError::InsufficientPalette);
    }
    let count = accepted.len();
    if count >= target {
        let mut accepted = accepted;
        accepted.truncate(target);
        return Ok(accepted);
    }

    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(&accepted);
    for i in 0..(target - count) {
        out.push(accepted[i % count].clone());
    }
    Ok(out)
}
