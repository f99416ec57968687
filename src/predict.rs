use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{Classifier, DecodeError, LabelDecoder};
use crate::registry::Target;
use crate::schema::{reconcile, DefaultTable, ReconciledRow, ValidationError};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("{0}")]
    Scoring(String),

    #[error(transparent)]
    Decoding(#[from] DecodeError),
}

/// Scores one reconciled row and renders the class as a string, decoded to its
/// label when a decoder is available.
pub fn predict(
    classifier: &dyn Classifier,
    decoder: Option<&LabelDecoder>,
    row: &ReconciledRow,
    log_features: bool,
) -> Result<String, PredictionError> {
    let x = classifier.schema().encode(row)?;

    if log_features {
        log_row(classifier, &x);
    }

    let raw = classifier
        .predict(&x)
        .map_err(|e| PredictionError::Scoring(format!("{e:#}")))?;

    match decoder {
        Some(d) => Ok(d.decode(&raw)?),
        None => Ok(raw.to_string()),
    }
}

/// Reconcile-then-predict for one request body.
pub fn predict_record(
    target: &Target,
    defaults: &DefaultTable,
    input: &Map<String, Value>,
    log_features: bool,
) -> Result<String, PredictionError> {
    let row = reconcile(target.classifier.schema(), defaults, input);
    predict(
        target.classifier.as_ref(),
        target.decoder.as_deref(),
        &row,
        log_features,
    )
}

// Debug signal so we can confirm we're not sending all-zeros
fn log_row(classifier: &dyn Classifier, x: &[f32]) {
    let nz = x.iter().filter(|v| **v != 0.0).count();
    let mean = if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f32>() / (x.len() as f32)
    };
    let std = if x.len() < 2 {
        0.0
    } else {
        (x.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / (x.len() as f32)).sqrt()
    };
    let sample: Vec<String> = classifier
        .schema()
        .slot_names()
        .iter()
        .zip(x)
        .take(6)
        .map(|(name, v)| format!("{}={:.3}", name, v))
        .collect();
    tracing::info!(
        "scoring in_dim={} nonzero={} mean={:.3} std={:.3} sample=[{}]",
        x.len(),
        nz,
        mean,
        std,
        sample.join(", ")
    );
}
