use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};

/// Stub backend for tests and offline runs. Returns a fixed detection list.
pub struct StubBackend {
    detections: Vec<Detection>,
    vocabulary: Option<Vec<String>>,
    calls: usize,
}

impl StubBackend {
    /// Behaves like a local closed-vocabulary model.
    pub fn closed_vocabulary(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            vocabulary: None,
            calls: 0,
        }
    }

    /// Behaves like the open-vocabulary service: detections outside
    /// `vocabulary` come back flagged as unknown.
    pub fn open_vocabulary(detections: Vec<Detection>, vocabulary: Vec<String>) -> Self {
        Self {
            detections,
            vocabulary: Some(vocabulary),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        match self.vocabulary {
            Some(_) => "stub-open-vocab",
            None => "stub-local",
        }
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        match self.vocabulary {
            Some(_) => matches!(capability, DetectionCapability::OpenVocabulary),
            None => matches!(capability, DetectionCapability::ClosedVocabulary),
        }
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<DetectionResult> {
        self.calls += 1;
        let detections = self.detections.clone();
        Ok(match &self.vocabulary {
            Some(vocab) => DetectionResult::partitioned(detections, |det| vocab.contains(&det.label)),
            None => DetectionResult::new(detections),
        })
    }
}
