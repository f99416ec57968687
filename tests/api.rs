//! End-to-end tests for the HTTP API, driven through the router with
//! in-memory classifiers standing in for the TorchScript models.

use aerovitals_backend::api::{router, AppState};
use aerovitals_backend::chat::ChatRelay;
use aerovitals_backend::config::Config;
use aerovitals_backend::model::{Classifier, LabelDecoder, RawClass};
use aerovitals_backend::registry::{ModelRegistry, Target};
use aerovitals_backend::schema::{DefaultTable, FeatureSchema, STANDARD_FIELDS};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

// Slot of "Stress Level" in the encoded row for the categories below:
// Age | Gender x2 | Occupation x3 | Sleep Duration | Quality | Activity | Stress
const STRESS_SLOT: usize = 9;

fn test_schema() -> FeatureSchema {
    let feat_list: Vec<String> = STANDARD_FIELDS.iter().map(|s| s.to_string()).collect();
    let cats: HashMap<String, Vec<String>> = [
        ("Gender", vec!["Female", "Male"]),
        ("Occupation", vec!["Doctor", "Nurse", "Software Engineer"]),
        ("BMI Category", vec!["Normal", "Normal Weight", "Obese", "Overweight"]),
        ("Blood Pressure", vec!["126/83", "140/90"]),
        ("Sleep Disorder", vec!["Insomnia", "None", "Sleep Apnea"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
    .collect();
    FeatureSchema::from_meta(&feat_list, &cats)
}

/// Class 2 when stressed, 1 otherwise; refuses negative ages the way a real
/// scorer might fail on out-of-distribution input.
struct StressRule {
    schema: FeatureSchema,
}

impl Classifier for StressRule {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, x: &[f32]) -> anyhow::Result<RawClass> {
        if x[0] < 0.0 {
            anyhow::bail!("negative age rejected by scorer");
        }
        Ok(RawClass::Index(if x[STRESS_SLOT] >= 7.0 { 2 } else { 1 }))
    }
}

fn registry() -> ModelRegistry {
    let sleep = Target::new(
        Arc::new(StressRule {
            schema: test_schema(),
        }),
        Some(LabelDecoder::new(vec![
            "Insomnia".into(),
            "None".into(),
            "Sleep Apnea".into(),
        ])),
    );
    let stress = Target::new(
        Arc::new(StressRule {
            schema: test_schema(),
        }),
        None,
    );
    ModelRegistry::new(sleep, stress, DefaultTable::standard()).unwrap()
}

fn app_with(cfg: &Config) -> axum::Router {
    let chat = ChatRelay::new(cfg).unwrap();
    router(AppState::new(registry(), chat, true))
}

fn app() -> axum::Router {
    app_with(&Config::default())
}

fn make_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn make_post_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 100_000)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

fn full_record(stress: u32) -> Value {
    json!({
        "Age": 35,
        "Gender": "Female",
        "Occupation": "Nurse",
        "Sleep Duration": 6.4,
        "Quality of Sleep": 6,
        "Physical Activity Level": 40,
        "Stress Level": stress,
        "BMI Category": "Overweight",
        "Blood Pressure": "140/90",
        "Heart Rate": 78,
        "Daily Steps": 4200,
        "Sleep Disorder": "None"
    })
}

// --- info endpoints ---

#[tokio::test]
async fn root_lists_endpoints() {
    let (status, json) = send(app(), make_request("/")).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["message"], "Aerovitals API is running");
    assert_eq!(json["endpoints"]["predict_sleep_disorder"], "/predict_sleep_disorder");
    assert_eq!(json["endpoints"]["chat"], "/chat");
}

#[tokio::test]
async fn health_is_healthy() {
    let (status, json) = send(app(), make_request("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "healthy");
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn health_monitoring_returns_mock_vitals() {
    let (status, json) = send(app(), make_request("/health-monitoring")).await;
    assert_eq!(status, 200);
    assert_eq!(json["source"], "mock_data");
    let spo2 = json["spo2"].as_f64().unwrap();
    assert!((90.0..=100.0).contains(&spo2));
    assert!(json["temperature"].is_number());
    assert!(json["heart_rate"].is_number());
    assert!(json["timestamp"].as_u64().unwrap() > 0);
}

// --- prediction ---

#[tokio::test]
async fn empty_object_is_bad_request() {
    let (status, json) = send(app(), make_post_request("/predict_sleep_disorder", json!({}))).await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "No data provided");
}

#[tokio::test]
async fn missing_body_is_bad_request() {
    let req = Request::builder()
        .method("POST")
        .uri("/predict_stress_level")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app(), req).await;
    assert_eq!(status, 400);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn full_record_is_decoded_when_decoder_loaded() {
    let (status, json) = send(
        app(),
        make_post_request("/predict_sleep_disorder", full_record(8)),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["prediction"], "Sleep Apnea");

    let (_, json) = send(
        app(),
        make_post_request("/predict_sleep_disorder", full_record(3)),
    )
    .await;
    assert_eq!(json["prediction"], "None");
}

#[tokio::test]
async fn raw_class_string_without_decoder() {
    let (status, json) = send(
        app(),
        make_post_request("/predict_stress_level", full_record(8)),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["prediction"], "2");
}

#[tokio::test]
async fn partial_record_is_filled_with_defaults() {
    let (status, json) = send(
        app(),
        make_post_request("/predict_stress_level", json!({"Age": 29})),
    )
    .await;
    assert_eq!(status, 200);
    // Stress Level defaults to 0
    assert_eq!(json["prediction"], "1");
}

#[tokio::test]
async fn wrong_type_is_bad_request() {
    let (status, json) = send(
        app(),
        make_post_request("/predict_sleep_disorder", json!({"Age": "thirty"})),
    )
    .await;
    assert_eq!(status, 400);
    let msg = json["error"].as_str().unwrap();
    assert!(msg.starts_with("Invalid input"), "{}", msg);
    assert!(msg.contains("Age"));
}

#[tokio::test]
async fn scoring_failure_is_server_error_and_service_continues() {
    let app = app();
    let mut bad = full_record(5);
    bad["Age"] = json!(-4);

    let (status, json) = send(
        app.clone(),
        make_post_request("/predict_sleep_disorder", bad),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(
        json["error"],
        "Prediction failed: negative age rejected by scorer"
    );

    let (status, json) = send(
        app,
        make_post_request("/predict_sleep_disorder", full_record(5)),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["prediction"], "None");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let req = Request::builder()
        .uri("/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

// --- heart rate ---

#[tokio::test]
async fn heartrate_threshold() {
    for (hr, expected) in [
        (json!(101), true),
        (json!(100), false),
        (json!("120"), true),
        (json!("not a number"), false),
        (Value::Null, false),
    ] {
        let (status, json) = send(
            app(),
            make_post_request("/heartrate", json!({ "heart_rate": hr.clone() })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(json["play_music"], expected, "heart_rate {}", hr);
    }
}

#[tokio::test]
async fn heartrate_without_body_is_false() {
    let req = Request::builder()
        .method("POST")
        .uri("/heartrate")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app(), req).await;
    assert_eq!(status, 200);
    assert_eq!(json["play_music"], false);
}

// --- chat ---

async fn spawn_upstream() -> String {
    use axum::{http::HeaderMap, routing::post, Json};

    async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, String) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer gsk_good" {
            return (StatusCode::UNAUTHORIZED, "invalid api key".to_string());
        }
        let question = body["messages"][1]["content"].as_str().unwrap_or_default();
        let reply = json!({
            "choices": [{"message": {"role": "assistant", "content": format!("echo: {question}")}}]
        });
        (StatusCode::OK, reply.to_string())
    }

    let app = axum::Router::new().route("/v1/chat/completions", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/chat/completions")
}

fn chat_config(url: &str, key: Option<&str>) -> Config {
    Config {
        groq_api_url: url.to_string(),
        groq_api_key: key.map(str::to_string),
        chat_timeout_secs: 5,
        ..Config::default()
    }
}

#[tokio::test]
async fn chat_without_key_explains() {
    let (status, json) = send(
        app(),
        make_post_request("/chat", json!({"message": "I have a headache"})),
    )
    .await;
    assert_eq!(status, 200);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("Error: GROQ_API_KEY not found"));
}

#[tokio::test]
async fn chat_relays_upstream_answer() {
    let url = spawn_upstream().await;
    let app = app_with(&chat_config(&url, Some("gsk_good")));
    let (status, json) = send(
        app,
        make_post_request("/chat", json!({"message": "ears popping"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["response"], "echo: ears popping");
}

#[tokio::test]
async fn chat_reports_upstream_status_inline() {
    let url = spawn_upstream().await;
    let app = app_with(&chat_config(&url, Some("gsk_bad")));
    let (status, json) = send(
        app,
        make_post_request("/chat", json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["response"], "[Error] 401: invalid api key");
}

#[tokio::test]
async fn chat_reports_unreachable_upstream_inline() {
    let app = app_with(&chat_config(
        "http://127.0.0.1:1/v1/chat/completions",
        Some("gsk_good"),
    ));
    let (status, json) = send(
        app,
        make_post_request("/chat", json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, 200);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("Error connecting to Groq API:"));
}
