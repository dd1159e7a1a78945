//! Input Collector - raw form/API values to a FeatureVector
//!
//! Enforces schema order and defaults. Numerical values pass through
//! unvalidated beyond being finite; categorical values must map to one of
//! the declared codes, either directly or through their label.

use std::collections::HashMap;

use serde::Deserialize;

use super::layout::{FeatureKind, FeatureSchema, FeatureSpec};
use super::vector::FeatureVector;
use crate::logic::error::{RiskError, RiskResult};

/// One raw value as supplied by the form (text) or the JSON API (number or text)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

pub struct InputCollector<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> InputCollector<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// Collect one value per schema entry, keyed by form key or display name.
    /// Missing entries take the feature default.
    pub fn collect(&self, raw: &HashMap<String, RawValue>) -> RiskResult<FeatureVector> {
        for key in raw.keys() {
            if self.schema.index_of_key(key).is_none() {
                log::debug!("Ignoring unknown input field '{}'", key);
            }
        }

        let mut values = Vec::with_capacity(self.schema.len());
        for spec in self.schema.specs {
            let supplied = raw.get(spec.key).or_else(|| raw.get(spec.name));
            let value = match supplied {
                Some(v) => convert(spec, v)?,
                None => spec.default_value(),
            };
            values.push(value);
        }

        FeatureVector::from_values(self.schema, values)
    }

    /// Convenience for string-only sources such as url-encoded forms
    pub fn collect_form(&self, form: &HashMap<String, String>) -> RiskResult<FeatureVector> {
        let raw = form
            .iter()
            .map(|(k, v)| (k.clone(), RawValue::Text(v.clone())))
            .collect();
        self.collect(&raw)
    }

    /// Values already in schema order, e.g. from a JSON array
    pub fn collect_ordered(&self, values: &[RawValue]) -> RiskResult<FeatureVector> {
        if values.len() != self.schema.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.schema.len(),
                values.len()
            )));
        }

        let converted = self
            .schema
            .specs
            .iter()
            .zip(values)
            .map(|(spec, v)| convert(spec, v))
            .collect::<RiskResult<Vec<_>>>()?;

        FeatureVector::from_values(self.schema, converted)
    }
}

fn convert(spec: &FeatureSpec, raw: &RawValue) -> RiskResult<f64> {
    match spec.kind {
        FeatureKind::Numerical => convert_numerical(spec, raw),
        FeatureKind::Categorical { .. } => convert_categorical(spec, raw),
    }
}

fn convert_numerical(spec: &FeatureSpec, raw: &RawValue) -> RiskResult<f64> {
    let value = match raw {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(spec.default_value());
            }
            text.parse::<f64>().map_err(|_| {
                RiskError::invalid_input(spec.name, format!("'{}' is not a number", text))
            })?
        }
    };

    if !value.is_finite() {
        return Err(RiskError::invalid_input(spec.name, "value must be finite"));
    }
    Ok(value)
}

fn convert_categorical(spec: &FeatureSpec, raw: &RawValue) -> RiskResult<f64> {
    let options = spec.options();

    let found = match raw {
        RawValue::Number(n) => options.iter().find(|o| o.code as f64 == *n),
        RawValue::Text(text) => {
            let text = text.trim();
            options.iter().find(|o| {
                o.label.eq_ignore_ascii_case(text) || text.parse::<i64>() == Ok(o.code)
            })
        }
    };

    found.map(|o| o.code as f64).ok_or_else(|| {
        let allowed = options
            .iter()
            .map(|o| format!("{} ({})", o.label, o.code))
            .collect::<Vec<_>>()
            .join(", ");
        RiskError::invalid_input(spec.name, format!("expected one of {}", allowed))
    })
}
