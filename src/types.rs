use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------- Requests ----------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
}

// Accepts a number or a numeric string; interpretation is left to the check.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateRequest {
    pub heart_rate: Option<Value>,
}

// ---------- Responses ----------

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct HeartRateResponse {
    pub play_music: bool,
}

#[derive(Debug, Serialize)]
pub struct PredictionOut {
    pub prediction: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RootOut {
    pub message: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
    pub status: &'static str,
}
