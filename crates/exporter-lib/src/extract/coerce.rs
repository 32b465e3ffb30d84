//! Scalar coercion of decoded JSON values into `f64`

use crate::error::ExtractError;
use serde_json::Value;

/// Coerce a JSON scalar into a float.
///
/// Numbers pass through, booleans become `1.0`/`0.0`, strings are parsed as
/// floats and then as a `numerator/denominator` fraction.
pub fn coerce_f64(value: &Value) -> Result<f64, ExtractError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(ExtractError::UnsupportedType("number")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_numeric_str(s),
        Value::Null => Err(ExtractError::UnsupportedType("null")),
        Value::Array(_) => Err(ExtractError::UnsupportedType("array")),
        Value::Object(_) => Err(ExtractError::UnsupportedType("object")),
    }
}

/// Like [`coerce_f64`], but also accepts `"true"`/`"false"` strings.
///
/// Used for configuration flags, which the remote side reports as strings.
pub fn coerce_flag(value: &Value) -> Result<f64, ExtractError> {
    match value {
        Value::String(s) if s == "true" || s == "True" => Ok(1.0),
        Value::String(s) if s == "false" || s == "False" => Ok(0.0),
        other => coerce_f64(other),
    }
}

/// Parse a numeric string, including the `"4/83"` ratio encoding.
///
/// A zero denominator is unparseable rather than infinite.
pub fn parse_numeric_str(raw: &str) -> Result<f64, ExtractError> {
    if let Ok(v) = raw.parse::<f64>() {
        return Ok(v);
    }

    if let Some((numerator, denominator)) = raw.split_once('/') {
        if !denominator.contains('/') {
            let numerator = numerator.trim().parse::<f64>();
            let denominator = denominator.trim().parse::<f64>();
            if let (Ok(n), Ok(d)) = (numerator, denominator) {
                if d != 0.0 {
                    return Ok(n / d);
                }
            }
        }
    }

    Err(ExtractError::Unparseable(raw.to_string()))
}
