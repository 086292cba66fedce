use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::detect::result::DetectionResult;

/// Detection capabilities supported by backends.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Fixed trained label set, evaluated locally.
    ClosedVocabulary,
    /// Caller-supplied candidate classes.
    OpenVocabulary,
}

/// Operator-facing choice of analysis pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    #[default]
    Local,
    OpenVocab,
}

impl DetectionMode {
    pub fn capability(&self) -> DetectionCapability {
        match self {
            DetectionMode::Local => DetectionCapability::ClosedVocabulary,
            DetectionMode::OpenVocab => DetectionCapability::OpenVocabulary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Local => "local",
            DetectionMode::OpenVocab => "open-vocab",
        }
    }

    /// Label shown next to the mode selector.
    pub fn display_name(&self) -> &'static str {
        match self {
            DetectionMode::Local => "YOLO + VLM",
            DetectionMode::OpenVocab => "YOLO-World + VLM",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "yolo" => Ok(DetectionMode::Local),
            "open-vocab" | "open_vocab" | "yolo-world" => Ok(DetectionMode::OpenVocab),
            other => Err(anyhow!(
                "unknown detection mode '{}'; expected local or open-vocab",
                other
            )),
        }
    }
}

/// Detector backend trait.
///
/// Backends receive the full decoded image and return every instance they
/// report, in their own output order. Thresholding is the backend's concern.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on an image.
    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
