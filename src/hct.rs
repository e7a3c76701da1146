//! Hue / chroma / tone projection.
//!
//! Hue and chroma come from CAM16 under the default Material viewing
//! conditions, tone is CIE L*. Both directions are delegated to
//! `material_color_utilities_rs`; the reverse solver maps out-of-gamut
//! requests back into sRGB and yields whole 8-bit channels, so an
//! sRGB → HCT → sRGB round trip may move a channel by one step. A second
//! round trip reproduces the first.

use material_color_utilities_rs::htc::Hct as Cam16Hct;

use crate::color::PackedColor;

/// A color as hue (degrees), chroma and tone (0..=100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hct {
    pub hue: f64,
    pub chroma: f64,
    pub tone: f64,
}

impl Hct {
    pub fn new(hue: f64, chroma: f64, tone: f64) -> Self {
        Self { hue, chroma, tone }
    }

    pub fn from_packed(color: PackedColor) -> Self {
        let [r, g, b] = color.channels();
        let hct = Cam16Hct::from_int([0xFF, r, g, b]);
        Self { hue: hct.hue(), chroma: hct.chroma(), tone: hct.tone() }
    }

    /// Nearest displayable sRGB color.
    pub fn to_packed(self) -> PackedColor {
        let [_, r, g, b] = Cam16Hct::from(self.hue, self.chroma, self.tone).to_int();
        PackedColor::from_rgb(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn channel_drift(a: PackedColor, b: PackedColor) -> u8 {
        a.channels()
            .iter()
            .zip(b.channels())
            .map(|(x, y)| x.abs_diff(y))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn primaries_match_published_hct_values() {
        let red = Hct::from_packed(PackedColor::from_rgb(255, 0, 0));
        assert!(close(red.hue, 27.41, 0.5), "red hue {}", red.hue);
        assert!(close(red.chroma, 113.36, 1.5), "red chroma {}", red.chroma);
        assert!(close(red.tone, 53.24, 0.1), "red tone {}", red.tone);

        let green = Hct::from_packed(PackedColor::from_rgb(0, 255, 0));
        assert!(close(green.hue, 142.14, 0.5), "green hue {}", green.hue);
        assert!(close(green.tone, 87.74, 0.1), "green tone {}", green.tone);

        let blue = Hct::from_packed(PackedColor::from_rgb(0, 0, 255));
        assert!(close(blue.hue, 282.79, 0.5), "blue hue {}", blue.hue);
        assert!(close(blue.tone, 32.30, 0.1), "blue tone {}", blue.tone);
    }

    #[test]
    fn greys_have_no_chroma() {
        for v in [0u8, 64, 128, 200, 255] {
            let hct = Hct::from_packed(PackedColor::from_rgb(v, v, v));
            // incomplete adaptation leaves neutrals with a small residual chroma
            assert!(hct.chroma < 4.0, "grey {v} chroma {}", hct.chroma);
        }
        let white = Hct::from_packed(PackedColor::from_rgb(255, 255, 255));
        assert!(close(white.tone, 100.0, 0.01));
        let black = Hct::from_packed(PackedColor::from_rgb(0, 0, 0));
        assert!(close(black.tone, 0.0, 0.01));
    }

    #[test]
    fn forward_conversion_is_reproducible() {
        let c = PackedColor::from_rgb(12, 200, 99);
        assert_eq!(Hct::from_packed(c), Hct::from_packed(c));
    }

    #[test]
    fn primaries_survive_a_round_trip() {
        for c in [
            PackedColor::from_rgb(255, 0, 0),
            PackedColor::from_rgb(0, 255, 0),
            PackedColor::from_rgb(0, 0, 255),
            PackedColor::from_rgb(255, 255, 255),
            PackedColor::from_rgb(0, 0, 0),
        ] {
            assert_eq!(Hct::from_packed(c).to_packed(), c);
        }
    }

    #[test]
    fn round_trip_stays_within_one_step() {
        let samples = [
            PackedColor::from_rgb(34, 139, 34),
            PackedColor::from_rgb(250, 235, 215),
            PackedColor::from_rgb(128, 0, 128),
            PackedColor::from_rgb(10, 10, 10),
        ];
        for c in samples {
            let back = Hct::from_packed(c).to_packed();
            assert!(channel_drift(c, back) <= 1, "{c} -> {back}");
        }
    }

    #[test]
    fn second_round_trip_reproduces_the_first() {
        let steps = [0u8, 37, 51, 102, 128, 153, 204, 230, 255];
        for &r in &steps {
            for &g in &steps {
                for &b in &steps {
                    let once = Hct::from_packed(PackedColor::from_rgb(r, g, b)).to_packed();
                    let twice = Hct::from_packed(once).to_packed();
                    assert_eq!(once, twice, "({r}, {g}, {b})");
                }
            }
        }
    }

    #[test]
    fn out_of_gamut_chroma_is_mapped_into_srgb() {
        let c = Hct::new(120.0, 400.0, 50.0).to_packed();
        assert_eq!(c.argb() >> 24, 0xFF);
        let back = Hct::from_packed(c);
        assert!(back.chroma < 400.0);
        assert!(close(back.tone, 50.0, 1.0), "tone {}", back.tone);
    }

    #[test]
    fn zero_tone_is_black() {
        assert_eq!(Hct::new(30.0, 50.0, 0.0).to_packed(), PackedColor::from_rgb(0, 0, 0));
    }
}
