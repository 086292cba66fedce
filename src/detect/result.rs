use serde::{Deserialize, Serialize};

/// Axis-aligned box in source image pixels, `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a center point and size, truncating toward zero.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: (cx - w / 2.0) as i32,
            y1: (cy - h / 2.0) as i32,
            x2: (cx + w / 2.0) as i32,
            y2: (cy + h / 2.0) as i32,
        }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0) as i64 * (iy2 - iy1).max(0) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

/// One detected instance: the detector's `(label, confidence, box)` triple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Normalized detector output.
///
/// `labels` and `boxes` are index-aligned and keep the detector's output
/// order. `unknown` holds the subset of detections whose class fell outside
/// the requested vocabulary; closed-vocabulary backends leave it empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    labels: Vec<String>,
    boxes: Vec<BoundingBox>,
    unknown: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        let mut labels = Vec::with_capacity(detections.len());
        let mut boxes = Vec::with_capacity(detections.len());
        for det in detections {
            labels.push(det.label);
            boxes.push(det.bbox);
        }
        Self {
            labels,
            boxes,
            unknown: Vec::new(),
        }
    }

    /// Keep every detection and additionally flag the ones `is_known` rejects.
    pub fn partitioned<F>(detections: Vec<Detection>, is_known: F) -> Self
    where
        F: Fn(&Detection) -> bool,
    {
        let unknown = detections
            .iter()
            .filter(|det| !is_known(det))
            .cloned()
            .collect();
        Self {
            unknown,
            ..Self::new(detections)
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn unknown(&self) -> &[Detection] {
        &self.unknown
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundingBox)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.boxes.iter())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.label == det.label && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}
