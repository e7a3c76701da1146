use std::fmt;

/// A fully opaque color packed as `0xAARRGGBB`, alpha always `0xFF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedColor(u32);

const OPAQUE: u32 = 0xFF00_0000;

impl PackedColor {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        PackedColor(OPAQUE | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Build from an arbitrary 32-bit value, forcing the alpha byte opaque.
    pub const fn from_argb(argb: u32) -> Self {
        PackedColor(argb | OPAQUE)
    }

    #[inline]
    pub const fn argb(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub const fn channels(self) -> [u8; 3] {
        [self.red(), self.green(), self.blue()]
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red(), self.green(), self.blue())
    }
}

impl fmt::Display for PackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_channels_with_opaque_alpha() {
        let c = PackedColor::from_rgb(0x12, 0xab, 0x07);
        assert_eq!(c.argb(), 0xFF12_AB07);
        assert_eq!(c.channels(), [0x12, 0xab, 0x07]);
    }

    #[test]
    fn alpha_is_forced() {
        assert_eq!(PackedColor::from_argb(0x0000_00FF).argb(), 0xFF00_00FF);
    }

    #[test]
    fn hex_is_lowercase_six_digits() {
        assert_eq!(PackedColor::from_rgb(255, 0, 10).to_hex(), "#ff000a");
        assert_eq!(PackedColor::from_rgb(0, 0, 0).to_string(), "#000000");
    }
}
