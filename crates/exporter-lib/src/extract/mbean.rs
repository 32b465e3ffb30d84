//! MBean value extraction
//!
//! A JMX read comes back as an untyped JSON object whose shape depends on the
//! bean family: `{value: {Value: x}}` for gauges, `{value: x}` for plain
//! attributes, `{value: {Mean, 75thPercentile, ...}}` for histograms,
//! `{value: {used, max}}` for memory usage and so on. Extraction is an
//! ordered chain of probes; the first probe that recognizes the shape decides
//! the result.

use super::coerce::coerce_f64;
use crate::error::ExtractError;
use serde_json::{Map, Value};

/// One decoded JMX attribute read
pub type MBeanReading = Map<String, Value>;

/// Bean families with their own fallback fields, detected by name substring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeanFamily {
    Memory,
    Threading,
    Http,
}

impl BeanFamily {
    fn marker(self) -> &'static str {
        match self {
            BeanFamily::Memory => "Memory",
            BeanFamily::Threading => "Threading",
            BeanFamily::Http => "http",
        }
    }

    /// Whether `mbean` belongs to this family
    pub fn matches(self, mbean: &str) -> bool {
        mbean.contains(self.marker())
    }

    /// Fields to try, in order, for beans of this family
    pub fn fallback_fields(self) -> &'static [&'static str] {
        match self {
            BeanFamily::Memory => &["used", "max"],
            BeanFamily::Threading => &["ThreadCount"],
            BeanFamily::Http => &["mean", "count"],
        }
    }
}

/// A single extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `value` is an object: look for `Value`, then `value` inside it
    NestedValue,
    /// `value` is a scalar: coerce it directly
    ScalarValue,
    /// A named top-level field
    NamedField(&'static str),
    /// Family-specific fields, top level first, then inside `value`
    DomainFallback(BeanFamily),
}

/// Probe order used by [`extract_value`]
pub const PROBE_ORDER: &[Probe] = &[
    Probe::NestedValue,
    Probe::ScalarValue,
    Probe::NamedField("Value"),
    Probe::NamedField("Count"),
    Probe::NamedField("Mean"),
    Probe::DomainFallback(BeanFamily::Memory),
    Probe::DomainFallback(BeanFamily::Threading),
    Probe::DomainFallback(BeanFamily::Http),
];

impl Probe {
    /// `None` when the probe does not recognize the shape.
    ///
    /// `Some(Err(..))` means the shape matched but the payload did not coerce;
    /// the chain stops there.
    pub fn apply(self, reading: &MBeanReading, mbean: &str) -> Option<Result<f64, ExtractError>> {
        match self {
            Probe::NestedValue => {
                let inner = reading.get("value")?.as_object()?;
                ["Value", "value"]
                    .iter()
                    .find_map(|key| present(inner.get(*key)))
                    .map(coerce_f64)
            }
            Probe::ScalarValue => match present(reading.get("value"))? {
                Value::Object(_) => None,
                scalar => Some(coerce_f64(scalar)),
            },
            Probe::NamedField(field) => present(reading.get(field)).map(coerce_f64),
            Probe::DomainFallback(family) => {
                if !family.matches(mbean) {
                    return None;
                }
                family
                    .fallback_fields()
                    .iter()
                    .find_map(|field| lookup_field(reading, field))
                    .map(coerce_f64)
            }
        }
    }
}

/// Reduce one MBean reading to a single number.
pub fn extract_value(reading: &MBeanReading, mbean: &str) -> Result<f64, ExtractError> {
    if let Some(err) = remote_error(reading, mbean) {
        return Err(err);
    }

    PROBE_ORDER
        .iter()
        .find_map(|probe| probe.apply(reading, mbean))
        .unwrap_or_else(|| Err(ExtractError::UnrecognizedShape(mbean.to_string())))
}

/// Read a named field: top level first, then inside a nested `value` object.
pub fn field_value(reading: &MBeanReading, field: &str) -> Result<f64, ExtractError> {
    lookup_field(reading, field)
        .map(coerce_f64)
        .unwrap_or_else(|| Err(ExtractError::MissingField(field.to_string())))
}

/// Read a nested attribute such as `HeapMemoryUsage.used`.
///
/// The first segment is resolved like [`field_value`]; later segments walk
/// into objects.
pub fn path_value(reading: &MBeanReading, path: &[&str]) -> Result<f64, ExtractError> {
    let missing = || ExtractError::MissingField(path.join("."));
    let (first, rest) = path.split_first().ok_or_else(missing)?;

    let mut current = lookup_field(reading, first).ok_or_else(missing)?;
    for segment in rest {
        current = present(current.as_object().and_then(|o| o.get(*segment))).ok_or_else(missing)?;
    }
    coerce_f64(current)
}

/// Error reported by the read endpoint in place of a value
///
/// Bulk reads answer a failing bean with `{"status": 404, "error": "..."}` at
/// its position instead of failing the whole request.
pub fn remote_error(reading: &MBeanReading, mbean: &str) -> Option<ExtractError> {
    if reading.contains_key("value") {
        return None;
    }
    let message = reading.get("error")?.as_str()?;
    Some(ExtractError::Remote {
        mbean: mbean.to_string(),
        message: message.to_string(),
    })
}

fn lookup_field<'a>(reading: &'a MBeanReading, field: &str) -> Option<&'a Value> {
    present(reading.get(field)).or_else(|| {
        let inner = reading.get("value")?.as_object()?;
        present(inner.get(field))
    })
}

// JSON null counts as absent
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
