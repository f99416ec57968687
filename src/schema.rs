//! Feature schema, default table and row reconciliation.
//!
//! A request carries a partial record; the classifiers need every field of
//! their training schema, in training order. [`reconcile`] fills the gaps from
//! the [`DefaultTable`], and [`FeatureSchema::encode`] checks each value
//! against its declared kind before turning the row into model input.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Canonical field order shared by the sleep-disorder and stress-level models.
pub const STANDARD_FIELDS: [&str; 12] = [
    "Age",
    "Gender",
    "Occupation",
    "Sleep Duration",
    "Quality of Sleep",
    "Physical Activity Level",
    "Stress Level",
    "BMI Category",
    "Blood Pressure",
    "Heart Rate",
    "Daily Steps",
    "Sleep Disorder",
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("field '{field}' expects {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field '{field}' value {value} is not representable as a model input")]
    OutOfRange { field: String, value: String },

    #[error("field '{0}' is missing from the reconciled row")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Numeric,
    /// One-hot encoded over `categories`, in the listed order.
    Categorical(Vec<String>),
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "a number",
            FieldKind::Categorical(_) => "a string",
        }
    }

    fn width(&self) -> usize {
        match self {
            FieldKind::Numeric => 1,
            FieldKind::Categorical(cats) => cats.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Numeric,
        }
    }

    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        categories: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Categorical(categories.into_iter().map(Into::into).collect()),
        }
    }
}

/// Ordered list of fields a classifier was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    fields: Vec<Field>,
}

impl FeatureSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Builds a schema from a model's metadata: `feat_list` gives the order,
    /// any field listed in `categories` is categorical, the rest are numeric.
    pub fn from_meta(feat_list: &[String], categories: &HashMap<String, Vec<String>>) -> Self {
        let fields = feat_list
            .iter()
            .map(|name| match categories.get(name) {
                Some(cats) => Field::categorical(name.as_str(), cats.iter().cloned()),
                None => Field::numeric(name.as_str()),
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Length of the vector produced by [`FeatureSchema::encode`].
    pub fn encoded_width(&self) -> usize {
        self.fields.iter().map(|f| f.kind.width()).sum()
    }

    /// Label of each slot of the encoded row: the field name for numeric
    /// fields, `field[category]` for each one-hot slot.
    pub fn slot_names(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.encoded_width());
        for field in &self.fields {
            match &field.kind {
                FieldKind::Numeric => out.push(field.name.clone()),
                FieldKind::Categorical(cats) => {
                    out.extend(cats.iter().map(|c| format!("{}[{}]", field.name, c)))
                }
            }
        }
        out
    }

    /// Every default must have the kind of the field it fills, otherwise a
    /// request missing that field could never be encoded.
    pub fn check_defaults(&self, defaults: &DefaultTable) -> Result<(), ValidationError> {
        for field in &self.fields {
            let value = defaults.get(&field.name);
            let ok = match field.kind {
                FieldKind::Numeric => value.is_number(),
                FieldKind::Categorical(_) => value.is_string(),
            };
            if !ok {
                return Err(ValidationError::WrongType {
                    field: field.name.clone(),
                    expected: field.kind.expected(),
                    found: json_type(&value),
                });
            }
        }
        Ok(())
    }

    /// Validates a reconciled row against the declared kinds and flattens it
    /// into model input. Categories outside a field's vocabulary encode as an
    /// all-zero block.
    pub fn encode(&self, row: &ReconciledRow) -> Result<Vec<f32>, ValidationError> {
        let mut out = Vec::with_capacity(self.encoded_width());
        for field in &self.fields {
            let value = row
                .get(&field.name)
                .ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
            match &field.kind {
                FieldKind::Numeric => out.push(numeric_value(&field.name, value)?),
                FieldKind::Categorical(cats) => {
                    let Value::String(s) = value else {
                        return Err(ValidationError::WrongType {
                            field: field.name.clone(),
                            expected: field.kind.expected(),
                            found: json_type(value),
                        });
                    };
                    out.extend(cats.iter().map(|c| if c == s { 1.0 } else { 0.0 }));
                }
            }
        }
        Ok(out)
    }
}

fn numeric_value(field: &str, value: &Value) -> Result<f32, ValidationError> {
    let Value::Number(n) = value else {
        return Err(ValidationError::WrongType {
            field: field.to_string(),
            expected: FieldKind::Numeric.expected(),
            found: json_type(value),
        });
    };
    let x = n.as_f64().unwrap_or(f64::NAN);
    if !x.is_finite() || x.abs() > f32::MAX as f64 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: n.to_string(),
        });
    }
    Ok(x as f32)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fallback values for fields absent from a request.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultTable {
    text: HashMap<String, String>,
}

impl DefaultTable {
    pub fn new<K: Into<String>, V: Into<String>>(text: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            text: text
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The deployed defaults. Fields without a text default get numeric zero.
    pub fn standard() -> Self {
        Self::new([
            ("Blood Pressure", "Normal"),
            ("BMI Category", "Normal Weight"),
            ("Gender", "Male"),
            ("Occupation", "Software Engineer"),
            ("Sleep Disorder", "None"),
        ])
    }

    pub fn get(&self, field: &str) -> Value {
        match self.text.get(field) {
            Some(s) => Value::String(s.clone()),
            None => Value::from(0),
        }
    }
}

impl Default for DefaultTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A complete record: exactly the schema's fields, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    values: Vec<(String, Value)>,
}

impl ReconciledRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fills every schema field from `input` when present, from `defaults`
/// otherwise. Values are copied verbatim; unknown input fields are dropped.
pub fn reconcile(
    schema: &FeatureSchema,
    defaults: &DefaultTable,
    input: &Map<String, Value>,
) -> ReconciledRow {
    let values = schema
        .names()
        .map(|name| {
            let value = input.get(name).cloned().unwrap_or_else(|| defaults.get(name));
            (name.to_string(), value)
        })
        .collect();
    ReconciledRow { values }
}
