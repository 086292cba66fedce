//! Decoding for YOLOv8-style detection heads.
//!
//! The head emits `[4 + nc, N]` values per image: rows 0..4 are
//! center-x, center-y, width, height in model input pixels, and each of the
//! remaining `nc` rows is a class score.

use anyhow::{anyhow, Result};

use crate::detect::result::{non_max_suppression, BoundingBox, Detection};

pub const CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const IOU_THRESHOLD: f32 = 0.45;

/// Geometry needed to map model-space boxes back onto the source image.
#[derive(Clone, Copy, Debug)]
pub struct InputScale {
    pub model_width: u32,
    pub model_height: u32,
    pub image_width: u32,
    pub image_height: u32,
}

impl InputScale {
    fn sx(&self) -> f32 {
        self.image_width as f32 / self.model_width as f32
    }

    fn sy(&self) -> f32 {
        self.image_height as f32 / self.model_height as f32
    }
}

/// Decode a row-major `[4 + nc, n]` head into thresholded, suppressed detections.
pub fn decode_head(
    values: &[f32],
    n: usize,
    class_names: &[String],
    scale: InputScale,
) -> Result<Vec<Detection>> {
    let nc = class_names.len();
    if values.len() != (4 + nc) * n {
        return Err(anyhow!(
            "detection head has {} values; expected (4 + {}) x {}",
            values.len(),
            nc,
            n
        ));
    }
    let at = |row: usize, col: usize| values[row * n + col];

    let mut candidates = Vec::new();
    for i in 0..n {
        let best = (0..nc)
            .map(|c| (c, at(4 + c, i)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((class_id, score)) = best else {
            continue;
        };
        if score < CONFIDENCE_THRESHOLD {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, i) * scale.sx(),
            at(1, i) * scale.sy(),
            at(2, i) * scale.sx(),
            at(3, i) * scale.sy(),
        );
        candidates.push(Detection::new(class_names[class_id].clone(), score, bbox));
    }
    Ok(non_max_suppression(candidates, IOU_THRESHOLD))
}
