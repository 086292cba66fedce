use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::caption::{DEFAULT_CAPTION_ENDPOINT, MAX_NEW_TOKENS};
use crate::detect::open_vocab::{default_classes, DEFAULT_ENDPOINT};
use crate::detect::DetectionMode;

const DEFAULT_DB_PATH: &str = "logs.db";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_MODEL_SIZE: u32 = 640;
const DEFAULT_LOCAL_CLASSES: [&str; 6] = [
    "person",
    "vehicle_on_track",
    "rock",
    "rail_damage",
    "signal",
    "traffic_light",
];

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    db_path: Option<String>,
    api: Option<ApiConfigFile>,
    detection: Option<DetectionConfigFile>,
    open_vocab: Option<OpenVocabConfigFile>,
    captioner: Option<CaptionerConfigFile>,
    local_model: Option<LocalModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    default_mode: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenVocabConfigFile {
    endpoint: Option<String>,
    api_key: Option<String>,
    classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptionerConfigFile {
    endpoint: Option<String>,
    max_new_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalModelConfigFile {
    path: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub api_addr: String,
    pub default_mode: DetectionMode,
    pub open_vocab: OpenVocabSettings,
    pub captioner: CaptionerSettings,
    pub local_model: LocalModelSettings,
}

#[derive(Debug, Clone)]
pub struct OpenVocabSettings {
    pub endpoint: String,
    /// Empty when unset; open-vocab mode is then unavailable.
    pub api_key: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CaptionerSettings {
    pub endpoint: String,
    pub max_new_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LocalModelSettings {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub class_names: Vec<String>,
}

impl AppConfig {
    /// Load from the JSON file named by `RAILVIS_CONFIG` (if any), then
    /// apply `RAILVIS_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("RAILVIS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let default_mode = match file.detection.and_then(|detection| detection.default_mode) {
            Some(mode) => mode
                .parse::<DetectionMode>()
                .context("invalid detection.default_mode in config file")?,
            None => DetectionMode::default(),
        };
        let open_vocab = file.open_vocab.unwrap_or_default();
        let open_vocab = OpenVocabSettings {
            endpoint: open_vocab
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: open_vocab.api_key.unwrap_or_default(),
            classes: open_vocab.classes.unwrap_or_else(default_classes),
        };
        let captioner = file.captioner.unwrap_or_default();
        let captioner = CaptionerSettings {
            endpoint: captioner
                .endpoint
                .unwrap_or_else(|| DEFAULT_CAPTION_ENDPOINT.to_string()),
            max_new_tokens: captioner.max_new_tokens.unwrap_or(MAX_NEW_TOKENS),
        };
        let local_model = file.local_model.unwrap_or_default();
        let local_model = LocalModelSettings {
            path: local_model.path,
            width: local_model.width.unwrap_or(DEFAULT_MODEL_SIZE),
            height: local_model.height.unwrap_or(DEFAULT_MODEL_SIZE),
            class_names: local_model.class_names.unwrap_or_else(|| {
                DEFAULT_LOCAL_CLASSES
                    .iter()
                    .map(|c| c.to_string())
                    .collect()
            }),
        };
        Ok(Self {
            db_path,
            api_addr,
            default_mode,
            open_vocab,
            captioner,
            local_model,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("RAILVIS_DB_PATH") {
            self.db_path = path;
        }
        if let Some(addr) = non_empty_env("RAILVIS_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(mode) = non_empty_env("RAILVIS_MODE") {
            self.default_mode = mode
                .parse()
                .map_err(|e| anyhow!("RAILVIS_MODE: {}", e))?;
        }
        if let Some(endpoint) = non_empty_env("RAILVIS_OPEN_VOCAB_ENDPOINT") {
            self.open_vocab.endpoint = endpoint;
        }
        if let Some(key) = non_empty_env("RAILVIS_API_KEY") {
            self.open_vocab.api_key = key;
        }
        if let Ok(classes) = std::env::var("RAILVIS_OPEN_VOCAB_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.open_vocab.classes = parsed;
            }
        }
        if let Some(endpoint) = non_empty_env("RAILVIS_CAPTION_ENDPOINT") {
            self.captioner.endpoint = endpoint;
        }
        if let Some(path) = non_empty_env("RAILVIS_MODEL_PATH") {
            self.local_model.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.open_vocab.classes.is_empty() {
            return Err(anyhow!("open-vocabulary class list must not be empty"));
        }
        if self.local_model.class_names.is_empty() {
            return Err(anyhow!("local model class list must not be empty"));
        }
        if self.local_model.width == 0 || self.local_model.height == 0 {
            return Err(anyhow!("local model input size must be greater than zero"));
        }
        if self.captioner.max_new_tokens == 0 {
            return Err(anyhow!("captioner max_new_tokens must be greater than zero"));
        }
        self.api_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid api addr '{}': {}", self.api_addr, e))?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
