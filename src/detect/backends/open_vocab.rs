//! Remote open-vocabulary detection.
//!
//! The image is shipped as a base64 JPEG together with the candidate class
//! list. Anything the service returns outside that list is kept and flagged
//! as unknown; with a well-behaved service that list stays empty.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::image_io::encode_jpeg_base64;

pub const DEFAULT_ENDPOINT: &str = "https://infer.roboflow.com/foundation/yolo_world";

pub const DEFAULT_CLASSES: [&str; 9] = [
    "rock",
    "rail",
    "rail damage",
    "vehicle",
    "signal",
    "worker",
    "tree",
    "obstacle",
    "barrier",
];

pub fn default_classes() -> Vec<String> {
    DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()
}

#[derive(Clone, Debug)]
pub struct OpenVocabConfig {
    pub endpoint: String,
    pub api_key: String,
    pub classes: Vec<String>,
}

impl Default for OpenVocabConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            classes: default_classes(),
        }
    }
}

#[derive(Serialize)]
struct InferRequest<'a> {
    image: String,
    classes: &'a [String],
}

#[derive(Deserialize)]
struct InferResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    class: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
}

impl From<Prediction> for Detection {
    fn from(p: Prediction) -> Self {
        Detection {
            bbox: BoundingBox::from_center(p.x, p.y, p.width, p.height),
            label: p.class,
            confidence: p.confidence,
        }
    }
}

/// Client for the hosted open-vocabulary detector.
pub struct OpenVocabBackend {
    config: OpenVocabConfig,
}

impl OpenVocabBackend {
    pub fn new(config: OpenVocabConfig) -> Result<Self> {
        if config.classes.is_empty() {
            return Err(anyhow!("open-vocabulary backend needs at least one class"));
        }
        Ok(Self { config })
    }

    pub fn classes(&self) -> &[String] {
        &self.config.classes
    }

    fn request(&self, image: &RgbImage) -> Result<InferResponse> {
        let body = InferRequest {
            image: encode_jpeg_base64(image)?,
            classes: &self.config.classes,
        };
        let response = ureq::post(&self.config.endpoint)
            .query("api_key", &self.config.api_key)
            .send_json(&body)
            .with_context(|| format!("open-vocabulary request to {}", self.config.endpoint))?;
        response
            .into_json::<InferResponse>()
            .context("decode open-vocabulary response")
    }
}

impl DetectorBackend for OpenVocabBackend {
    fn name(&self) -> &'static str {
        "open-vocab"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::OpenVocabulary)
    }

    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult> {
        let response = self.request(image)?;
        let detections: Vec<Detection> = response
            .predictions
            .into_iter()
            .map(Detection::from)
            .collect();
        let classes = &self.config.classes;
        let result = DetectionResult::partitioned(detections, |det| classes.contains(&det.label));
        log::debug!(
            "open-vocabulary service returned {} detections ({} unknown)",
            result.len(),
            result.unknown().len()
        );
        Ok(result)
    }
}
