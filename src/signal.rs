//! Signal light color classification.
//!
//! Works on 8-bit HSV with hue in `0..=179` (degrees halved), saturation and
//! value in `0..=255`. Red is only matched at the low end of the hue circle;
//! magenta-leaning reds near 180 fall through to `Unknown`.

use std::ops::RangeInclusive;

use image::RgbImage;

use crate::SignalColor;

pub const RED_HUE: RangeInclusive<u8> = 0..=10;
pub const GREEN_HUE: RangeInclusive<u8> = 40..=90;
pub const MIN_SATURATION: u8 = 70;
pub const MIN_VALUE: u8 = 50;

/// Mask intensity sums (pixel count × 255) for the two hue bands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskSums {
    pub red: u64,
    pub green: u64,
}

impl MaskSums {
    pub fn verdict(&self) -> SignalColor {
        if self.red > self.green {
            SignalColor::Red
        } else if self.green > self.red {
            SignalColor::Green
        } else {
            SignalColor::Unknown
        }
    }
}

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv8(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 { 0 } else { (255 * diff + v / 2) / v };
    if diff == 0 {
        return (0, s as u8, v as u8);
    }

    let mut h = if v == r {
        60.0 * (g - b) as f32 / diff as f32
    } else if v == g {
        120.0 + 60.0 * (b - r) as f32 / diff as f32
    } else {
        240.0 + 60.0 * (r - g) as f32 / diff as f32
    };
    if h < 0.0 {
        h += 360.0;
    }
    let h = (h / 2.0).round() as i32 % 180;

    (h as u8, s as u8, v as u8)
}

fn in_band(hsv: (u8, u8, u8), hue: &RangeInclusive<u8>) -> bool {
    let (h, s, v) = hsv;
    hue.contains(&h) && s >= MIN_SATURATION && v >= MIN_VALUE
}

/// Sum the red and green masks over a region.
pub fn hue_mask_sums(region: &RgbImage) -> MaskSums {
    let mut sums = MaskSums::default();
    for pixel in region.pixels() {
        let [r, g, b] = pixel.0;
        let hsv = rgb_to_hsv8(r, g, b);
        if in_band(hsv, &RED_HUE) {
            sums.red += 255;
        }
        if in_band(hsv, &GREEN_HUE) {
            sums.green += 255;
        }
    }
    sums
}

/// Decide whether a cropped signal light reads red or green.
///
/// Ties, including an empty region, are `Unknown`.
pub fn classify_signal_color(region: &RgbImage) -> SignalColor {
    let sums = hue_mask_sums(region);
    let verdict = sums.verdict();
    log::debug!(
        "signal mask sums red={} green={} -> {}",
        sums.red,
        sums.green,
        verdict
    );
    verdict
}
