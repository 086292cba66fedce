//! Railway Vision
//!
//! This crate analyzes still images of railway scenes and keeps a local log of
//! the outcomes.
//!
//! # Architecture
//!
//! One analysis is a straight call chain:
//!
//! 1. **Detection**: a [`detect::DetectorBackend`] turns the image into labels and boxes.
//!    Two interchangeable variants exist: a local closed-vocabulary model and a
//!    remote open-vocabulary service.
//! 2. **Signal color**: boxes labeled as signals are cropped and classified Red/Green/Unknown.
//! 3. **Hazard**: an ordered first-match rule table maps labels + signal color to Low/Medium/High.
//! 4. **Caption**: a [`caption::Captioner`] describes the scene, optionally answering a question.
//! 5. **Compose**: everything is merged into one immutable [`AnalysisResult`].
//! 6. **Log**: the result is appended to a [`storage::LogStore`] with a timestamp and coordinates.
//!
//! # Module Structure
//!
//! - `signal`, `hazard`: the decision logic
//! - `detect`, `caption`: adapters over pretrained collaborators
//! - `analysis`: composition and the per-interaction pipeline
//! - `storage`, `report`: persistence and log presentation
//! - `api`, `config`: the operator-facing HTTP surface and its configuration

use anyhow::{anyhow, Result};
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod analysis;
pub mod api;
pub mod caption;
pub mod config;
pub mod detect;
pub mod hazard;
pub mod image_io;
pub mod report;
pub mod signal;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

pub use analysis::{
    analyze_and_save, compose_local, compose_open_vocab, unknown_objects_question, AnalysisOutcome,
    AnalyzeRequest, Analyzer,
};
pub use caption::{Captioner, HttpCaptioner, StaticCaptioner};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionCapability, DetectionMode, DetectionResult,
    DetectorBackend, OpenVocabBackend, StubBackend,
};
pub use hazard::{assess_hazard, matching_rule, HazardRule, HAZARD_RULES};
pub use signal::{classify_signal_color, hue_mask_sums, MaskSums};
pub use storage::{InMemoryLogStore, LogEntry, LogStore, NewLogEntry, SqliteLogStore};

pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:railway_vision_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

// -------------------- Verdict Types --------------------

/// Inferred illumination state of a railway signal light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalColor {
    Red,
    Green,
    #[default]
    Unknown,
}

impl SignalColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalColor::Red => "Red",
            SignalColor::Green => "Green",
            SignalColor::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SignalColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Red" => Ok(SignalColor::Red),
            "Green" => Ok(SignalColor::Green),
            "Unknown" => Ok(SignalColor::Unknown),
            other => Err(anyhow!("invalid signal color '{}'", other)),
        }
    }
}

/// Coarse three-tier severity of a scene.
///
/// Variants are declared in ascending severity so `Ord` follows severity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HazardLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl HazardLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLevel::Low => "Low",
            HazardLevel::Medium => "Medium",
            HazardLevel::High => "High",
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, HazardLevel::High)
    }
}

impl fmt::Display for HazardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HazardLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Low" => Ok(HazardLevel::Low),
            "Medium" => Ok(HazardLevel::Medium),
            "High" => Ok(HazardLevel::High),
            other => Err(anyhow!("invalid hazard level '{}'", other)),
        }
    }
}

/// Travel direction placeholder. Never computed from the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Straight,
    #[default]
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Straight => "Straight",
            Direction::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Straight" => Ok(Direction::Straight),
            "Unknown" => Ok(Direction::Unknown),
            other => Err(anyhow!("invalid direction '{}'", other)),
        }
    }
}

// -------------------- Analysis Result --------------------

/// Outcome of analyzing one image. Built once by a composer and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub labels: Vec<String>,
    pub signal_color: SignalColor,
    pub hazard_level: HazardLevel,
    pub direction: Direction,
}
