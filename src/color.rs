//! 8-bit-per-channel colour packing.
//!
//! A packed colour is a `u32` with red in the most significant byte, then
//! green, blue and alpha in the least significant byte (`0xRRGGBBAA`). The
//! vertex shader decodes it with shifts, so the bit layout here is the wire
//! contract between the CPU batcher and the GPU.

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// A colour quantized to `0xRRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PackedColor(pub u32);

impl PackedColor {
    pub const WHITE: Self = Self(0xFFFF_FFFF);

    /// Quantizes a normalized RGBA colour. Channels outside `[0, 1]` are clamped.
    pub fn from_rgba(rgba: Vec4) -> Self {
        Self(pack_rgba(rgba))
    }

    pub fn to_rgba(self) -> Vec4 {
        unpack_rgba(self.0)
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

fn quantize(channel: f32) -> u32 {
    // Truncates. NaN survives the clamp and saturates to 0 in the cast.
    (channel.clamp(0.0, 1.0) * 255.0) as u32
}

/// Packs a normalized RGBA colour into `0xRRGGBBAA`.
pub fn pack_rgba(rgba: Vec4) -> u32 {
    (quantize(rgba.x) << 24) | (quantize(rgba.y) << 16) | (quantize(rgba.z) << 8) | quantize(rgba.w)
}

/// Expands `0xRRGGBBAA` back into normalized channels.
pub fn unpack_rgba(packed: u32) -> Vec4 {
    let [r, g, b, a] = packed.to_be_bytes();
    Vec4::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        a as f32 / 255.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_lives_in_the_high_byte() {
        assert_eq!(pack_rgba(Vec4::new(1.0, 0.0, 0.0, 0.0)), 0xFF00_0000);
        assert_eq!(pack_rgba(Vec4::new(0.0, 0.0, 0.0, 1.0)), 0x0000_00FF);
        assert_eq!(
            PackedColor::from_rgba(Vec4::new(1.0, 0.5, 0.0, 1.0)).to_bytes(),
            [255, 127, 0, 255]
        );
    }

    #[test]
    fn fractional_channels_truncate() {
        assert_eq!(pack_rgba(Vec4::new(0.5, 0.9, 0.7, 1.0)), 0x7FE5_B2FF);
        assert_eq!(pack_rgba(Vec4::splat(254.9 / 255.0)), 0xFEFE_FEFE);
    }

    #[test]
    fn unpack_recovers_channels_within_quantization() {
        let samples = [
            Vec4::new(0.0, 0.25, 0.5, 1.0),
            Vec4::new(0.1, 0.2, 0.3, 0.4),
            Vec4::new(0.999, 0.001, 0.66, 0.33),
            Vec4::splat(0.8),
        ];
        for rgba in samples {
            let back = unpack_rgba(pack_rgba(rgba));
            let error = (back - rgba).abs().max_element();
            assert!(error <= 1.0 / 255.0, "{rgba:?} came back as {back:?}");
        }
    }

    #[test]
    fn out_of_range_channels_are_clamped() {
        assert_eq!(pack_rgba(Vec4::new(2.0, -1.0, f32::NAN, 1.0)), 0xFF00_00FF);
    }

    #[test]
    fn white_constant_matches_packing() {
        assert_eq!(PackedColor::from_rgba(Vec4::ONE), PackedColor::WHITE);
        assert_eq!(PackedColor::WHITE.to_rgba(), Vec4::ONE);
    }
}
