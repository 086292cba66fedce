use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::{prompt_for, Captioner, MAX_NEW_TOKENS};
use crate::image_io::encode_jpeg_base64;

pub const DEFAULT_CAPTION_ENDPOINT: &str = "http://127.0.0.1:8600/caption";

#[derive(Clone, Debug)]
pub struct HttpCaptionerConfig {
    pub endpoint: String,
    pub max_new_tokens: u32,
}

impl Default for HttpCaptionerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CAPTION_ENDPOINT.to_string(),
            max_new_tokens: MAX_NEW_TOKENS,
        }
    }
}

#[derive(Serialize)]
struct CaptionRequest<'a> {
    image: String,
    prompt: &'a str,
    max_new_tokens: u32,
}

#[derive(Deserialize)]
struct CaptionResponse {
    caption: String,
}

/// Captioner backed by an image-captioning model served over HTTP.
pub struct HttpCaptioner {
    config: HttpCaptionerConfig,
}

impl HttpCaptioner {
    pub fn new(config: HttpCaptionerConfig) -> Result<Self> {
        if config.max_new_tokens == 0 {
            return Err(anyhow!("max_new_tokens must be greater than zero"));
        }
        Ok(Self { config })
    }
}

impl Captioner for HttpCaptioner {
    fn name(&self) -> &'static str {
        "http"
    }

    fn caption(&mut self, image: &RgbImage, question: Option<&str>) -> Result<String> {
        let prompt = prompt_for(question);
        let body = CaptionRequest {
            image: encode_jpeg_base64(image)?,
            prompt: &prompt,
            max_new_tokens: self.config.max_new_tokens,
        };
        let response = ureq::post(&self.config.endpoint)
            .send_json(&body)
            .with_context(|| format!("caption request to {}", self.config.endpoint))?;
        let parsed: CaptionResponse = response
            .into_json()
            .context("decode caption response")?;
        Ok(parsed.caption.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeService;

    fn captioner_for(service: &FakeService) -> HttpCaptioner {
        HttpCaptioner::new(HttpCaptionerConfig {
            endpoint: service.url("/caption"),
            ..HttpCaptionerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn sends_prompt_and_budget_and_trims_caption() {
        let service =
            FakeService::respond_once(200, r#"{"caption":"  a freight train beside a red signal \n"}"#);
        let mut captioner = captioner_for(&service);
        let caption = captioner
            .caption(&RgbImage::new(4, 4), Some("What are the unknown objects in this image?"))
            .unwrap();
        assert_eq!(caption, "a freight train beside a red signal");

        let request = service.captured();
        assert!(request.request_line.starts_with("POST /caption "));
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(
            body["prompt"],
            "Question: What are the unknown objects in this image? Answer:"
        );
        assert_eq!(body["max_new_tokens"], 100);
    }

    #[test]
    fn malformed_response_is_an_error() {
        let service = FakeService::respond_once(200, r#"{"text":"no caption field"}"#);
        let mut captioner = captioner_for(&service);
        assert!(captioner.caption(&RgbImage::new(2, 2), None).is_err());
        service.captured();
    }

    #[test]
    fn server_error_status_is_an_error() {
        let service = FakeService::respond_once(503, r#"{"error":"model loading"}"#);
        let mut captioner = captioner_for(&service);
        let err = captioner.caption(&RgbImage::new(2, 2), None).unwrap_err();
        assert!(format!("{:#}", err).contains("caption request to"));
        let request = service.captured();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&request.body).unwrap()["prompt"],
            "Describe the scene."
        );
    }

    #[test]
    fn zero_token_budget_is_rejected() {
        assert!(HttpCaptioner::new(HttpCaptionerConfig {
            max_new_tokens: 0,
            ..HttpCaptionerConfig::default()
        })
        .is_err());
    }
}
