use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

pub const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub sleep_model_path: PathBuf,
    pub sleep_meta_path: PathBuf,
    pub sleep_decoder_path: PathBuf,
    pub stress_model_path: PathBuf,
    pub stress_meta_path: PathBuf,
    pub stress_decoder_path: PathBuf,
    pub groq_api_key: Option<String>,
    pub groq_api_url: String,
    pub groq_model: String,
    pub chat_timeout_secs: u64,
    pub log_features: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            sleep_model_path: "models/sleep_disorder_pred_v2.pt".into(),
            sleep_meta_path: "models/sleep_disorder_pred_v2.meta.json".into(),
            sleep_decoder_path: "models/sleep_disorder_label_encoder.json".into(),
            stress_model_path: "models/stress_level_pred_v2.pt".into(),
            stress_meta_path: "models/stress_level_pred_v2.meta.json".into(),
            stress_decoder_path: "models/stress_level_label_encoder.json".into(),
            groq_api_key: None,
            groq_api_url: DEFAULT_GROQ_API_URL.to_string(),
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            chat_timeout_secs: 30,
            log_features: false,
        }
    }
}

impl Config {
    /// Reads the JSON file named by `AEROVITALS_CONFIG` (if set), then applies
    /// environment overrides. Call after `dotenvy::dotenv()`.
    pub fn load() -> Result<Self> {
        let base = match std::env::var("AEROVITALS_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path))
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production).
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("PORT") {
            self.port = v
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", v))?;
        }
        for (key, slot) in [
            ("SLEEP_MODEL_PATH", &mut self.sleep_model_path),
            ("SLEEP_META_PATH", &mut self.sleep_meta_path),
            ("SLEEP_DECODER_PATH", &mut self.sleep_decoder_path),
            ("STRESS_MODEL_PATH", &mut self.stress_model_path),
            ("STRESS_META_PATH", &mut self.stress_meta_path),
            ("STRESS_DECODER_PATH", &mut self.stress_decoder_path),
        ] {
            if let Some(v) = var(key) {
                *slot = v.into();
            }
        }
        if let Some(v) = var("GROQ_API_KEY") {
            self.groq_api_key = Some(v);
        }
        if let Some(v) = var("GROQ_API_URL") {
            self.groq_api_url = v;
        }
        if let Some(v) = var("GROQ_MODEL") {
            self.groq_model = v;
        }
        if let Some(v) = var("CHAT_TIMEOUT_SECS") {
            self.chat_timeout_secs = v
                .parse()
                .with_context(|| format!("CHAT_TIMEOUT_SECS must be whole seconds, got {:?}", v))?;
        }
        if let Some(v) = var("LOG_PRED") {
            self.log_features = v == "1";
        }
        Ok(self)
    }
}
