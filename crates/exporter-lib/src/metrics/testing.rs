//! Registry inspection helpers for tests

use prometheus::proto::{Metric, MetricType};
use prometheus::Registry;

fn labels_match(metric: &Metric, labels: &[(&str, &str)]) -> bool {
    let pairs = metric.get_label();
    pairs.len() == labels.len()
        && labels.iter().all(|(name, value)| {
            pairs
                .iter()
                .any(|p| p.get_name() == *name && p.get_value() == *value)
        })
}

/// Value of the series `name{labels}`; histograms report their sample count
pub fn sample(registry: &Registry, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let families = registry.gather();
    let family = families.iter().find(|mf| mf.get_name() == name)?;
    let metric = family.get_metric().iter().find(|m| labels_match(m, labels))?;

    Some(match family.get_field_type() {
        MetricType::COUNTER => metric.get_counter().get_value(),
        MetricType::HISTOGRAM => metric.get_histogram().get_sample_count() as f64,
        _ => metric.get_gauge().get_value(),
    })
}

/// Number of series currently exported under `name`
pub fn series_count(registry: &Registry, name: &str) -> usize {
    registry
        .gather()
        .iter()
        .find(|mf| mf.get_name() == name)
        .map(|mf| mf.get_metric().len())
        .unwrap_or(0)
}
