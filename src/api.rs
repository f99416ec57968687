use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::chat::ChatRelay;
use crate::error::ApiError;
use crate::predict::predict_record;
use crate::registry::{ModelRegistry, Target};
use crate::types::{
    ChatRequest, ChatResponse, HealthOut, HeartRateRequest, HeartRateResponse, PredictionOut,
    RootOut,
};
use crate::vitals::{now_unix_secs, sample_vitals, should_play_music, Vitals};

const RUNNING: &str = "Aerovitals API is running";

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelRegistry>,
    pub chat: Arc<ChatRelay>,
    pub log_features: bool,
}

impl AppState {
    pub fn new(models: ModelRegistry, chat: ChatRelay, log_features: bool) -> Self {
        Self {
            models: Arc::new(models),
            chat: Arc::new(chat),
            log_features,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/heartrate", post(heart_rate))
        .route("/health-monitoring", get(health_monitoring))
        .route("/predict_sleep_disorder", post(predict_sleep_disorder))
        .route("/predict_stress_level", post(predict_stress_level))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------- Handlers ----------

async fn root() -> Json<RootOut> {
    let endpoints = BTreeMap::from([
        ("health", "/health"),
        ("chat", "/chat"),
        ("heartrate", "/heartrate"),
        ("health_monitoring", "/health-monitoring"),
        ("predict_sleep_disorder", "/predict_sleep_disorder"),
        ("predict_stress_level", "/predict_stress_level"),
    ]);
    Json(RootOut {
        message: RUNNING,
        endpoints,
        status: "healthy",
    })
}

async fn health() -> Json<HealthOut> {
    Json(HealthOut {
        status: "healthy",
        message: RUNNING,
    })
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Json<ChatResponse> {
    let req: ChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    let response = state.chat.chat(&req.message).await;
    Json(ChatResponse { response })
}

async fn heart_rate(body: Bytes) -> Json<HeartRateResponse> {
    let req: HeartRateRequest = serde_json::from_slice(&body).unwrap_or_default();
    Json(HeartRateResponse {
        play_music: should_play_music(req.heart_rate.as_ref()),
    })
}

async fn health_monitoring() -> Result<Json<Vitals>, ApiError> {
    let now = now_unix_secs().map_err(|e| {
        tracing::error!("Error in health monitoring: {}", e);
        ApiError::Vitals(e.to_string())
    })?;
    Ok(Json(sample_vitals(now, &mut rand::thread_rng())))
}

async fn predict_sleep_disorder(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionOut>, ApiError> {
    serve_prediction("sleep disorder", &state.models.sleep, &state, &body)
}

async fn predict_stress_level(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionOut>, ApiError> {
    serve_prediction("stress level", &state.models.stress, &state, &body)
}

fn serve_prediction(
    what: &str,
    target: &Target,
    state: &AppState,
    body: &[u8],
) -> Result<Json<PredictionOut>, ApiError> {
    let record = record_from_body(body)?;
    match predict_record(target, &state.models.defaults, &record, state.log_features) {
        Ok(prediction) => Ok(Json(PredictionOut { prediction })),
        Err(e) => {
            let err = ApiError::from(e);
            if err.status().is_server_error() {
                tracing::error!("Error in {} prediction: {}", what, err);
            } else {
                tracing::warn!("rejected {} request: {}", what, err);
            }
            Err(err)
        }
    }
}

/// Parses a prediction request body. Blank bodies and JSON values that carry
/// nothing (`null`, `{}`, `[]`, `""`, `0`, `false`) count as no data.
fn record_from_body(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::NoData);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Null | Value::Bool(false) | Value::Object(_) => Err(ApiError::NoData),
        Value::Array(a) if a.is_empty() => Err(ApiError::NoData),
        Value::String(s) if s.is_empty() => Err(ApiError::NoData),
        Value::Number(n) if n.as_f64() == Some(0.0) => Err(ApiError::NoData),
        _ => Err(ApiError::InvalidBody(
            "expected a JSON object of feature values".to_string(),
        )),
    }
}
