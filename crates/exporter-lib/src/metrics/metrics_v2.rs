//! Series derived from the `/metrics/v2` status payload

use super::{gauge_vec, NAMESPACE};
use crate::extract::coerce_flag;
use crate::models::MetricsV2Response;
use prometheus::{GaugeVec, Registry};
use serde_json::{Map, Value};

const INFO_FIELDS: [&str; 5] = ["product", "vendor", "version", "agent", "protocol"];

pub struct MetricsV2Metrics {
    status: GaugeVec,
    timestamp: GaugeVec,
    info: GaugeVec,
    config: GaugeVec,
}

impl MetricsV2Metrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            status: gauge_vec(
                registry,
                NAMESPACE,
                "metrics_v2_status",
                "Status code returned by /metrics/v2 endpoint (HTTP-style status)",
                &[],
            )?,
            timestamp: gauge_vec(
                registry,
                NAMESPACE,
                "metrics_v2_timestamp",
                "Response timestamp from /metrics/v2 endpoint (UNIX epoch)",
                &[],
            )?,
            info: gauge_vec(
                registry,
                NAMESPACE,
                "metrics_v2_info",
                "Information fields from /metrics/v2 exported as labels (always 1)",
                &INFO_FIELDS,
            )?,
            config: gauge_vec(
                registry,
                NAMESPACE,
                "metrics_v2_config",
                "Boolean/numeric representation of config items from /metrics/v2",
                &["key"],
            )?,
        })
    }

    /// Info and config series mirror the latest payload only
    pub fn update(&self, response: &MetricsV2Response) {
        self.status.with_label_values(&[]).set(response.status as f64);
        self.timestamp
            .with_label_values(&[])
            .set(response.timestamp as f64);

        self.info.reset();
        self.config.reset();

        let Some(value) = &response.value else {
            return;
        };

        let labels = info_labels(value);
        if labels.iter().any(|l| !l.is_empty()) {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            self.info.with_label_values(&labels).set(1.0);
        }

        if let Some(Value::Object(config)) = value.get("config") {
            for (key, raw) in config {
                if let Ok(v) = coerce_flag(raw) {
                    if v.is_finite() {
                        self.config.with_label_values(&[key]).set(v);
                    }
                }
            }
        }
    }
}

/// Info label values: each field from the top level, else from `info`
fn info_labels(value: &Map<String, Value>) -> [String; 5] {
    let nested = value.get("info").and_then(Value::as_object);
    INFO_FIELDS.map(|field| {
        label_string(value.get(field))
            .or_else(|| nested.and_then(|info| label_string(info.get(field))))
            .unwrap_or_default()
    })
}

fn label_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
