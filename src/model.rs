use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::HashMap, fmt, fs, io, path::Path};
use tch::{kind::Kind, CModule, Device, Tensor};
use thiserror::Error;

use crate::schema::{FeatureSchema, STANDARD_FIELDS};

/// What a classifier hands back for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RawClass {
    Index(i64),
    Scalar(f64),
    Label(String),
}

impl fmt::Display for RawClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawClass::Index(i) => write!(f, "{i}"),
            // Debug keeps the trailing ".0" on integral floats.
            RawClass::Scalar(x) => write!(f, "{x:?}"),
            RawClass::Label(s) => f.write_str(s),
        }
    }
}

/// A loaded, read-only scorer. Implementations must be safe to share across
/// request handlers.
pub trait Classifier: Send + Sync {
    fn schema(&self) -> &FeatureSchema;

    /// Scores one encoded row laid out as `schema().encode(..)` produces it.
    fn predict(&self, x: &[f32]) -> Result<RawClass>;
}

#[derive(Deserialize)]
struct MetaJson {
    feat_list: Option<Vec<String>>,
    #[serde(default)]
    categories: HashMap<String, Vec<String>>,
    in_dim: Option<usize>,
}

/// TorchScript classifier plus the metadata describing its input layout.
pub struct TorchClassifier {
    model: CModule,
    device: Device,
    schema: FeatureSchema,
    in_dim: usize,
}

impl TorchClassifier {
    pub fn load(model_path: &Path, meta_path: &Path) -> Result<Self> {
        let device = Device::Cpu;

        // Load meta.json to get feature ordering and category vocabularies
        let meta_txt = fs::read_to_string(meta_path)
            .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
        let meta: MetaJson = serde_json::from_str(&meta_txt)
            .with_context(|| format!("failed to parse {}", meta_path.display()))?;

        let feat_list = meta
            .feat_list
            .unwrap_or_else(|| STANDARD_FIELDS.iter().map(|s| s.to_string()).collect());
        for name in meta.categories.keys() {
            if !feat_list.contains(name) {
                tracing::warn!(
                    "{}: categories given for '{}' which is not in feat_list",
                    meta_path.display(),
                    name
                );
            }
        }
        let schema = FeatureSchema::from_meta(&feat_list, &meta.categories);
        let in_dim = schema.encoded_width();
        if let Some(declared) = meta.in_dim {
            if declared != in_dim {
                bail!(
                    "{}: in_dim is {} but the feature layout encodes to {}",
                    meta_path.display(),
                    declared,
                    in_dim
                );
            }
        }

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

        let clf = Self {
            model,
            device,
            schema,
            in_dim,
        };

        // Warmup forward on zeros also proves the output shape is usable
        clf.predict(&vec![0.0; in_dim])
            .with_context(|| format!("warmup forward failed for {}", model_path.display()))?;

        Ok(clf)
    }
}

impl Classifier for TorchClassifier {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, x: &[f32]) -> Result<RawClass> {
        if x.len() != self.in_dim {
            bail!(
                "feature length mismatch: got {}, expected {}",
                x.len(),
                self.in_dim
            );
        }

        let input = Tensor::from_slice(x)
            .reshape([1, self.in_dim as i64])
            .to_device(self.device);

        let out = tch::no_grad(|| self.model.forward_ts(&[input]))?;
        let sz = out.size();
        match sz.as_slice() {
            // Class scores: [1, n_classes]
            [1, n] if *n > 1 => {
                let idx = out.argmax(-1, false);
                Ok(RawClass::Index(idx.int64_value(&[0])))
            }
            // Direct class output: [1] or [1, 1]
            [1] | [1, 1] => {
                let flat = out.reshape([-1]);
                if matches!(
                    flat.kind(),
                    Kind::Float | Kind::Double | Kind::Half | Kind::BFloat16
                ) {
                    Ok(RawClass::Scalar(flat.double_value(&[0])))
                } else {
                    Ok(RawClass::Index(flat.int64_value(&[0])))
                }
            }
            _ => bail!("unexpected model output size: {:?}", sz),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("class index {index} is outside the {n_classes} known labels")]
    UnknownIndex { index: i64, n_classes: usize },

    #[error("class value {0} is not an integral class index")]
    NotAnIndex(String),
}

/// A fitted encoder's class, as written to the decoder file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassJson {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Deserialize)]
struct DecoderJson {
    classes: Vec<ClassJson>,
}

impl From<DecoderJson> for LabelDecoder {
    fn from(d: DecoderJson) -> Self {
        let classes = d
            .classes
            .into_iter()
            .map(|c| match c {
                ClassJson::Int(i) => RawClass::Index(i),
                ClassJson::Float(x) => RawClass::Scalar(x),
                ClassJson::Text(s) => RawClass::Label(s),
            })
            .map(|c| c.to_string())
            .collect();
        Self { classes }
    }
}

/// Maps class indices back to the labels a model was trained on. Numeric
/// classes are kept in their string rendering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "DecoderJson")]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn decode(&self, raw: &RawClass) -> Result<String, DecodeError> {
        let index = match raw {
            RawClass::Index(i) => *i,
            RawClass::Scalar(x) if x.fract() == 0.0 && x.is_finite() => *x as i64,
            other => return Err(DecodeError::NotAnIndex(other.to_string())),
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .cloned()
            .ok_or(DecodeError::UnknownIndex {
                index,
                n_classes: self.classes.len(),
            })
    }
}

/// Reads a label decoder. A file that does not exist means the model has no
/// decoder; anything else that goes wrong is an error for the caller to judge.
pub fn load_decoder(path: &Path) -> Result<Option<LabelDecoder>> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read decoder {}", path.display()))
        }
    };
    let decoder: LabelDecoder = serde_json::from_str(&txt)
        .with_context(|| format!("failed to parse decoder {}", path.display()))?;
    if decoder.classes.is_empty() {
        bail!("decoder {} lists no classes", path.display());
    }
    Ok(Some(decoder))
}
