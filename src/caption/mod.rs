//! Scene captioning.
//!
//! A captioner either describes the scene or answers one free-text question
//! about it. Every call runs inference; nothing is cached or retried.

mod http;

use anyhow::Result;
use image::RgbImage;

pub use http::{HttpCaptioner, HttpCaptionerConfig, DEFAULT_CAPTION_ENDPOINT};

/// Generation budget handed to the captioning model.
pub const MAX_NEW_TOKENS: u32 = 100;

const DESCRIBE_PROMPT: &str = "Describe the scene.";

/// Prompt sent to the captioner for an optional question.
pub fn prompt_for(question: Option<&str>) -> String {
    match question {
        Some(q) => format!("Question: {} Answer:", q),
        None => DESCRIBE_PROMPT.to_string(),
    }
}

pub trait Captioner: Send {
    fn name(&self) -> &'static str;

    /// Caption `image`, answering `question` when one is given.
    fn caption(&mut self, image: &RgbImage, question: Option<&str>) -> Result<String>;
}

/// Captioner that always answers with the same text.
///
/// Records the prompts it was asked so callers can check what was sent.
#[derive(Clone, Debug, Default)]
pub struct StaticCaptioner {
    caption: String,
    prompts: Vec<String>,
}

impl StaticCaptioner {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            prompts: Vec::new(),
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Captioner for StaticCaptioner {
    fn name(&self) -> &'static str {
        "static"
    }

    fn caption(&mut self, _image: &RgbImage, question: Option<&str>) -> Result<String> {
        self.prompts.push(prompt_for(question));
        Ok(self.caption.clone())
    }
}
