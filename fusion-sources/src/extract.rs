//! Pulling values out of provider responses.

use fusion_types::Extract;
use serde_json::Value;

use crate::FetchError;

/// A value pulled out of a response, with an optional categorical label.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: f64,
    pub label: Option<String>,
}

impl Extracted {
    fn value(value: f64) -> Self {
        Self { value, label: None }
    }
}

/// Apply an extraction rule to a parsed JSON body.
pub fn extract(rule: &Extract, body: &Value) -> Result<Extracted, FetchError> {
    match rule {
        Extract::Number { pointer, default } => match body.pointer(pointer) {
            Some(v) if !v.is_null() => number(pointer, v).map(Extracted::value),
            _ => default
                .map(Extracted::value)
                .ok_or_else(|| FetchError::MissingField(pointer.clone())),
        },

        Extract::LastObservation { array, field } => {
            let items = body
                .pointer(array)
                .and_then(Value::as_array)
                .ok_or_else(|| FetchError::MissingField(array.clone()))?;
            let last = items
                .last()
                .ok_or_else(|| FetchError::MissingField(format!("{}/-", array)))?;
            let v = last
                .get(field)
                .ok_or_else(|| FetchError::MissingField(format!("{}/-/{}", array, field)))?;
            number(field, v).map(Extracted::value)
        }

        Extract::Index {
            value,
            classification,
        } => {
            let v = body
                .pointer(value)
                .ok_or_else(|| FetchError::MissingField(value.clone()))?;
            let label = body
                .pointer(classification)
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(Extracted {
                value: number(value, v)?,
                label,
            })
        }

        Extract::Throughput {
            sample,
            count,
            period,
        } => {
            let sample_obj = body
                .pointer(sample)
                .ok_or_else(|| FetchError::MissingField(sample.clone()))?;
            let count = match sample_obj.get(count) {
                Some(v) => number(count, v)?,
                None => 0.0,
            };
            let period = match sample_obj.get(period) {
                Some(v) => number(period, v)?,
                None => 1.0,
            };
            let rate = count / period.max(1.0);
            Ok(Extracted::value((rate * 100.0).round() / 100.0))
        }
    }
}

/// Read a number or numeric string.
fn number(field: &str, v: &Value) -> Result<f64, FetchError> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
        .ok_or_else(|| FetchError::Parse(format!("{} is not numeric: {}", field, v)))
}

/// Escape a single key for use as a JSON pointer token.
pub(crate) fn pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
