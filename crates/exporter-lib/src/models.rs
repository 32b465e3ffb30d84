//! Core data models for the PuppetDB exporter

use crate::extract::coerce_f64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Node record from `/pdb/query/v4/nodes`
///
/// PuppetDB reports unknown fields as `null`; empty strings are treated the
/// same way by the accessors below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub certname: String,
    pub deactivated: Option<String>,
    pub expired: Option<String>,
    pub latest_report_status: Option<String>,
    pub report_environment: Option<String>,
    pub facts_environment: Option<String>,
    pub report_timestamp: Option<String>,
    pub catalog_timestamp: Option<String>,
    pub facts_timestamp: Option<String>,
    pub latest_report_hash: Option<String>,
    pub cached_catalog_status: Option<String>,
    pub latest_report_noop: Option<bool>,
    pub latest_report_noop_pending: Option<bool>,
}

impl Node {
    /// A node is active until PuppetDB stamps a deactivation time on it
    pub fn is_active(&self) -> bool {
        non_empty(&self.deactivated).is_none()
    }

    /// Label value for `deactivated`
    pub fn deactivated_label(&self) -> &'static str {
        if self.is_active() {
            "false"
        } else {
            "true"
        }
    }

    pub fn environment(&self) -> &str {
        non_empty(&self.report_environment).unwrap_or_default()
    }

    pub fn report_timestamp(&self) -> Option<&str> {
        non_empty(&self.report_timestamp)
    }

    pub fn catalog_timestamp(&self) -> Option<&str> {
        non_empty(&self.catalog_timestamp)
    }

    pub fn facts_timestamp(&self) -> Option<&str> {
        non_empty(&self.facts_timestamp)
    }

    /// Catalog time, if present and parseable
    pub fn catalog_time(&self) -> Option<DateTime<Utc>> {
        self.catalog_timestamp().and_then(|t| parse_timestamp(t).ok())
    }

    /// Facts time, if present and parseable
    pub fn facts_time(&self) -> Option<DateTime<Utc>> {
        self.facts_timestamp().and_then(|t| parse_timestamp(t).ok())
    }

    pub fn latest_report_hash(&self) -> Option<&str> {
        non_empty(&self.latest_report_hash)
    }

    pub fn latest_report_status(&self) -> Option<&str> {
        non_empty(&self.latest_report_status)
    }
}

/// Parse a PuppetDB timestamp (RFC 3339, fractional seconds allowed).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// One counter from a node's latest report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetric {
    pub category: String,
    pub name: String,
    pub value: f64,
}

impl ReportMetric {
    /// Name as shown in the `name` label
    pub fn display_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

/// Entry of `/status/v1/services`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceStatus {
    pub service_version: String,
    pub service_status_version: i64,
    pub detail_level: String,
    pub state: String,
    pub status: Option<Value>,
    pub active_alerts: Vec<Value>,
}

/// Service state as exported
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub state: String,
    pub up: bool,
    pub queue_depth: Option<f64>,
}

impl ServiceInfo {
    pub fn from_status(name: &str, status: &ServiceStatus) -> Self {
        let name = if name.is_empty() { "puppetdb" } else { name };
        let queue_depth = status
            .status
            .as_ref()
            .and_then(|s| s.get("queue_depth"))
            .and_then(|v| coerce_f64(v).ok());

        Self {
            name: name.to_string(),
            version: status.service_version.clone(),
            state: status.state.clone(),
            up: status.state == "running",
            queue_depth,
        }
    }
}

/// Response of `/metrics/v2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsV2Response {
    pub request: Option<Value>,
    pub value: Option<Map<String, Value>>,
    pub timestamp: i64,
    pub status: i64,
}

/// Node count per status bucket for one scrape cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusTally {
    counts: BTreeMap<String, u64>,
}

impl StatusTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: &str) {
        *self.counts.entry(status.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, status: &str) -> u64 {
        self.counts.get(status).copied().unwrap_or(0)
    }

    /// Number of classified nodes
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
