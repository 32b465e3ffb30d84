//! Per-node report, catalog and facts series

use super::{gauge_vec, set_present, NAMESPACE, REPORT_NAMESPACE};
use crate::models::{Node, ReportMetric, StatusTally};
use chrono::{DateTime, Utc};
use prometheus::{GaugeVec, Registry};
use std::collections::HashMap;

const NODE_LABELS: &[&str] = &["environment", "host"];

/// What the node pass learned about one node with a known report time
#[derive(Debug, Clone)]
pub struct NodeSample {
    pub node: Node,
    pub report_time: DateTime<Utc>,
    /// Empty when the report metrics could not be fetched
    pub report_metrics: Vec<ReportMetric>,
}

pub struct NodeMetrics {
    report: GaugeVec,
    report_status_count: GaugeVec,
    has_report: GaugeVec,
    latest_report_noop: GaugeVec,
    latest_report_noop_pending: GaugeVec,
    report_age: GaugeVec,
    catalog_age: GaugeVec,
    facts_age: GaugeVec,
    catalog_timestamp: GaugeVec,
    facts_timestamp: GaugeVec,
    report_metrics: HashMap<String, GaugeVec>,
}

impl NodeMetrics {
    pub fn new(registry: &Registry, categories: &[String]) -> prometheus::Result<Self> {
        let node_gauge = |name: &str, help: &str| gauge_vec(registry, NAMESPACE, name, help, NODE_LABELS);

        let mut report_metrics = HashMap::new();
        for category in categories {
            if report_metrics.contains_key(category) {
                continue;
            }
            let vec = gauge_vec(
                registry,
                REPORT_NAMESPACE,
                &format!("report_{category}"),
                &format!("Number of {category} by status (divided by name/environment/host)"),
                &["name", "environment", "host"],
            )?;
            report_metrics.insert(category.clone(), vec);
        }

        Ok(Self {
            report: gauge_vec(
                registry,
                REPORT_NAMESPACE,
                "report",
                "Timestamp of node's latest report (UNIX epoch)",
                &["environment", "host", "deactivated"],
            )?,
            report_status_count: gauge_vec(
                registry,
                NAMESPACE,
                "node_report_status_count",
                "Number of nodes by latest report status (changed/failed/unchanged/unreported)",
                &["status"],
            )?,
            has_report: node_gauge("node_has_report", "Whether node has a latest report (1=yes, 0=no)")?,
            latest_report_noop: node_gauge(
                "node_latest_report_noop",
                "Whether node's latest report is noop (1=yes, 0=no)",
            )?,
            latest_report_noop_pending: node_gauge(
                "node_latest_report_noop_pending",
                "Whether node's latest report has noop changes pending (1=yes, 0=no)",
            )?,
            report_age: node_gauge("node_report_age_seconds", "Age of node's latest report in seconds")?,
            catalog_age: node_gauge("node_catalog_age_seconds", "Age of node's catalog in seconds")?,
            facts_age: node_gauge("node_facts_age_seconds", "Age of node's facts in seconds")?,
            catalog_timestamp: node_gauge("node_catalog_timestamp", "Node catalog timestamp (UNIX epoch)")?,
            facts_timestamp: node_gauge("node_facts_timestamp", "Node facts timestamp (UNIX epoch)")?,
            report_metrics,
        })
    }

    /// Drop every node series so nodes that disappeared leave nothing behind
    pub fn reset(&self) {
        for vec in [
            &self.report,
            &self.report_status_count,
            &self.has_report,
            &self.latest_report_noop,
            &self.latest_report_noop_pending,
            &self.report_age,
            &self.catalog_age,
            &self.facts_age,
            &self.catalog_timestamp,
            &self.facts_timestamp,
        ] {
            vec.reset();
        }
        for vec in self.report_metrics.values() {
            vec.reset();
        }
    }

    /// Replace the whole node domain with one cycle's samples and tally
    pub fn publish(&self, samples: &[NodeSample], tally: &StatusTally, now: DateTime<Utc>) {
        self.reset();
        for sample in samples {
            self.update_node(&sample.node, sample.report_time, now);
            self.update_report_metrics(&sample.node, &sample.report_metrics);
        }
        self.update_status_count(tally);
    }

    /// Publish the series of one node whose report time is known
    pub fn update_node(&self, node: &Node, report_time: DateTime<Utc>, now: DateTime<Utc>) {
        let env = node.environment();
        let labels = [env, node.certname.as_str()];

        self.report
            .with_label_values(&[env, &node.certname, node.deactivated_label()])
            .set(report_time.timestamp() as f64);

        self.has_report
            .with_label_values(&labels)
            .set(flag(node.latest_report_hash().is_some()));
        self.latest_report_noop
            .with_label_values(&labels)
            .set(flag(node.latest_report_noop.unwrap_or(false)));
        self.latest_report_noop_pending
            .with_label_values(&labels)
            .set(flag(node.latest_report_noop_pending.unwrap_or(false)));

        set_present(&self.report_age, &labels, Some(age_seconds(now, report_time)));

        if let Some(catalog) = node.catalog_time() {
            self.catalog_timestamp
                .with_label_values(&labels)
                .set(catalog.timestamp() as f64);
            set_present(&self.catalog_age, &labels, Some(age_seconds(now, catalog)));
        }
        if let Some(facts) = node.facts_time() {
            self.facts_timestamp
                .with_label_values(&labels)
                .set(facts.timestamp() as f64);
            set_present(&self.facts_age, &labels, Some(age_seconds(now, facts)));
        }
    }

    /// Publish report counters for the configured categories; others are ignored
    pub fn update_report_metrics(&self, node: &Node, metrics: &[ReportMetric]) {
        for metric in metrics {
            let Some(vec) = self.report_metrics.get(&metric.category) else {
                continue;
            };
            if !metric.value.is_finite() {
                continue;
            }
            vec.with_label_values(&[&metric.display_name(), node.environment(), &node.certname])
                .set(metric.value);
        }
    }

    pub fn update_status_count(&self, tally: &StatusTally) {
        for (status, count) in tally.iter() {
            self.report_status_count
                .with_label_values(&[status])
                .set(count as f64);
        }
    }
}

/// Seconds elapsed between `then` and `now`, millisecond precision
pub fn age_seconds(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 1000.0
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
