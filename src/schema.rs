//! Feature schema and sample coercion
//!
//! Input samples are free-form JSON objects. [`coerce`] turns one into a record
//! holding exactly the schema's declared fields: numeric fields become JSON
//! numbers, categorical fields become strings, and anything missing or
//! unusable becomes `null` so the server can apply its own imputation. A bad
//! field never fails the whole sample.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{PredictError, Result};

/// One input record: field name to scalar value, in insertion order.
pub type Sample = Map<String, Value>;

/// Declares how each field of a sample is coerced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default)]
    pub categorical: Vec<String>,
}

impl FeatureSchema {
    pub fn new<N, C>(numeric: N, categorical: C) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            numeric: numeric.into_iter().map(Into::into).collect(),
            categorical: categorical.into_iter().map(Into::into).collect(),
        }
    }

    /// The two field sets must not share a name.
    pub fn validate(&self) -> Result<()> {
        let numeric: HashSet<&str> = self.numeric.iter().map(String::as_str).collect();
        if let Some(dup) = self.categorical.iter().find(|c| numeric.contains(c.as_str())) {
            return Err(PredictError::config(format!(
                "field '{dup}' is declared both numeric and categorical"
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convert a JSON value into a [`Sample`]; only objects qualify.
pub fn into_sample(value: Value) -> Result<Sample> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PredictError::config(format!(
            "sample must be a JSON object, got {other}"
        ))),
    }
}

/// Build the schema-conformant record for `sample`. Never mutates the input.
pub fn coerce(sample: &Sample, schema: &FeatureSchema) -> Sample {
    let mut out = Map::with_capacity(schema.len());
    for name in &schema.numeric {
        let value = sample
            .get(name)
            .and_then(to_number)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        out.insert(name.clone(), value);
    }
    for name in &schema.categorical {
        let value = sample
            .get(name)
            .and_then(to_text)
            .map(Value::String)
            .unwrap_or(Value::Null);
        out.insert(name.clone(), value);
    }
    out
}

fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::Bool(b) => Some(Number::from(u8::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(i) = s.parse::<i64>() {
                return Some(Number::from(i));
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
