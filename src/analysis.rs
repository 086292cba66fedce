//! Result composition and the per-interaction analysis pipeline.
//!
//! The two detection modes fold their outputs differently:
//!
//! - local: signal color from signal-labeled crops, hazard from the rule table
//! - open-vocabulary: no signal color, hazard is High whenever the service
//!   returned any out-of-vocabulary object, Low otherwise
//!
//! The open-vocabulary hazard policy is coarser than the rule table and is
//! intentionally kept separate from it.

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::caption::{Captioner, HttpCaptioner, HttpCaptionerConfig};
use crate::config::AppConfig;
use crate::detect::{BackendRegistry, DetectionMode, DetectionResult, OpenVocabBackend, OpenVocabConfig};
use crate::hazard::assess_hazard;
use crate::image_io::crop_region;
use crate::signal::classify_signal_color;
use crate::storage::{LogEntry, LogStore, NewLogEntry};
use crate::{AnalysisResult, Direction, HazardLevel, SignalColor};

/// Labels whose boxes are treated as signal lights.
pub const SIGNAL_LABELS: [&str; 2] = ["signal", "traffic_light"];

pub const UNKNOWN_OBJECTS_QUESTION: &str = "What are the unknown objects in this image?";

/// Question to put to the captioner, if any, given the number of unknown objects.
pub fn unknown_objects_question(unknown_count: usize) -> Option<&'static str> {
    (unknown_count > 0).then_some(UNKNOWN_OBJECTS_QUESTION)
}

/// Color of the last signal-labeled box with a non-empty crop.
pub fn resolve_signal_color(image: &RgbImage, detections: &DetectionResult) -> SignalColor {
    let mut color = SignalColor::Unknown;
    for (label, bbox) in detections.iter() {
        if !SIGNAL_LABELS.contains(&label) {
            continue;
        }
        if let Some(region) = crop_region(image, bbox) {
            color = classify_signal_color(&region);
        }
    }
    color
}

fn with_caption(summary: String, caption: &str) -> String {
    format!("{}\nVLM says: {}", summary, caption)
}

/// Compose the result for the local closed-vocabulary path.
pub fn compose_local(
    image: &RgbImage,
    detections: &DetectionResult,
    caption: &str,
) -> AnalysisResult {
    let labels = detections.labels().to_vec();
    let signal_color = resolve_signal_color(image, detections);
    let hazard_level = assess_hazard(&labels, signal_color);
    let summary = format!("Detected: {}", labels.join(", "));
    AnalysisResult {
        summary: with_caption(summary, caption),
        labels,
        signal_color,
        hazard_level,
        direction: Direction::Straight,
    }
}

/// Compose the result for the remote open-vocabulary path.
pub fn compose_open_vocab(detections: &DetectionResult, caption: &str) -> AnalysisResult {
    let unknowns = detections.unknown().len();
    let summary = format!(
        "YOLO-World Detected {} objects. Unknowns: {}",
        detections.len(),
        unknowns
    );
    AnalysisResult {
        summary: with_caption(summary, caption),
        labels: detections.labels().to_vec(),
        signal_color: SignalColor::Unknown,
        hazard_level: if unknowns > 0 {
            HazardLevel::High
        } else {
            HazardLevel::Low
        },
        direction: Direction::Unknown,
    }
}

/// Detector registry plus captioner; runs one analysis at a time.
pub struct Analyzer {
    registry: BackendRegistry,
    captioner: Box<dyn Captioner>,
}

impl Analyzer {
    pub fn new(registry: BackendRegistry, captioner: Box<dyn Captioner>) -> Self {
        Self {
            registry,
            captioner,
        }
    }

    /// Wire up the configured backends and the HTTP captioner.
    ///
    /// The open-vocabulary backend is registered only when an API key is set,
    /// the local backend only when built with `backend-tract` and a model path
    /// is configured. A mode with no backend fails at analysis time.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let mut registry = BackendRegistry::new();
        register_local_backend(&mut registry, cfg)?;
        if cfg.open_vocab.api_key.trim().is_empty() {
            log::warn!("no open-vocabulary API key configured; open-vocab mode is unavailable");
        } else {
            registry.register(OpenVocabBackend::new(OpenVocabConfig {
                endpoint: cfg.open_vocab.endpoint.clone(),
                api_key: cfg.open_vocab.api_key.clone(),
                classes: cfg.open_vocab.classes.clone(),
            })?);
        }
        let captioner = HttpCaptioner::new(HttpCaptionerConfig {
            endpoint: cfg.captioner.endpoint.clone(),
            max_new_tokens: cfg.captioner.max_new_tokens,
        })?;
        Ok(Self::new(registry, Box::new(captioner)))
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn analyze(&mut self, image: &RgbImage, mode: DetectionMode) -> Result<AnalysisResult> {
        let detections = self.registry.detect_for_mode(mode, image)?;
        let result = match mode {
            DetectionMode::Local => {
                let caption = self.captioner.caption(image, None)?;
                compose_local(image, &detections, &caption)
            }
            DetectionMode::OpenVocab => {
                let question = unknown_objects_question(detections.unknown().len());
                let caption = self.captioner.caption(image, question)?;
                compose_open_vocab(&detections, &caption)
            }
        };
        log::info!(
            "analysis complete: mode={} labels={} signal={} hazard={}",
            mode,
            result.labels.len(),
            result.signal_color,
            result.hazard_level
        );
        Ok(result)
    }
}

#[cfg(feature = "backend-tract")]
fn register_local_backend(registry: &mut BackendRegistry, cfg: &AppConfig) -> Result<()> {
    match &cfg.local_model.path {
        Some(path) => {
            registry.register(crate::detect::TractBackend::new(
                path,
                cfg.local_model.width,
                cfg.local_model.height,
                cfg.local_model.class_names.clone(),
            )?);
        }
        None => log::warn!("no local model path configured; local mode is unavailable"),
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_local_backend(_registry: &mut BackendRegistry, cfg: &AppConfig) -> Result<()> {
    if cfg.local_model.path.is_some() {
        log::warn!("local model configured but built without backend-tract; local mode is unavailable");
    }
    Ok(())
}

/// Provenance and mode for one analyze interaction.
#[derive(Clone, Debug)]
pub struct AnalyzeRequest {
    pub image_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub mode: DetectionMode,
}

impl AnalyzeRequest {
    pub fn new(image_name: impl Into<String>, mode: DetectionMode) -> Self {
        Self {
            image_name: image_name.into(),
            latitude: 0.0,
            longitude: 0.0,
            mode,
        }
    }
}

/// Result of an analyze interaction after it was logged.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub entry: LogEntry,
    /// Raised when the hazard level calls for an operator alert.
    pub alert: bool,
}

/// Analyze `image` and append the outcome to `store`.
pub fn analyze_and_save(
    analyzer: &mut Analyzer,
    store: &mut dyn LogStore,
    image: &RgbImage,
    request: &AnalyzeRequest,
) -> Result<AnalysisOutcome> {
    let result = analyzer.analyze(image, request.mode)?;
    let entry = store.save(
        &NewLogEntry::new(request.image_name.clone(), result.clone())
            .with_coordinates(request.latitude, request.longitude),
    )?;
    let alert = result.hazard_level.is_alert();
    if alert {
        log::warn!(
            "HIGH hazard detected in {} (log id {})",
            entry.image_name,
            entry.id
        );
    }
    log::info!("log {} saved for {}", entry.id, entry.image_name);
    Ok(AnalysisOutcome {
        result,
        entry,
        alert,
    })
}
