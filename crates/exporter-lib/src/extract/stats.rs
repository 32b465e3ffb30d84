//! Codahale-style statistic readings
//!
//! PuppetDB publishes timers and histograms as one MBean carrying every
//! summary field at once. These structs pull the fields out individually so
//! a missing or malformed field drops only that series.

use super::mbean::{field_value, MBeanReading};

/// Summary fields of a timer or histogram bean
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramStats {
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p95: Option<f64>,
    pub p98: Option<f64>,
    pub p99: Option<f64>,
    pub p999: Option<f64>,
    pub count: Option<f64>,
}

impl HistogramStats {
    pub fn from_reading(reading: &MBeanReading) -> Self {
        let field = |name: &str| field_value(reading, name).ok();
        Self {
            mean: field("Mean"),
            stddev: field("StdDev"),
            min: field("Min"),
            max: field("Max"),
            p50: field("50thPercentile"),
            p75: field("75thPercentile"),
            p95: field("95thPercentile"),
            p98: field("98thPercentile"),
            p99: field("99thPercentile"),
            p999: field("999thPercentile"),
            count: field("Count"),
        }
    }

    /// Divide every duration field by `divisor`. `count` is left alone.
    pub fn scaled(self, divisor: f64) -> Self {
        let scale = |v: Option<f64>| v.map(|v| v / divisor);
        Self {
            mean: scale(self.mean),
            stddev: scale(self.stddev),
            min: scale(self.min),
            max: scale(self.max),
            p50: scale(self.p50),
            p75: scale(self.p75),
            p95: scale(self.p95),
            p98: scale(self.p98),
            p99: scale(self.p99),
            p999: scale(self.p999),
            count: self.count,
        }
    }

    /// `stat` label and value of the summary fields
    pub fn summary(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("mean", self.mean),
            ("stddev", self.stddev),
            ("min", self.min),
            ("max", self.max),
        ]
    }

    /// `percentile` label and value of the percentile fields
    pub fn percentiles(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("50", self.p50),
            ("75", self.p75),
            ("95", self.p95),
            ("98", self.p98),
            ("99", self.p99),
            ("999", self.p999),
        ]
    }
}

/// Fields of a meter bean
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateStats {
    pub one_minute: Option<f64>,
    pub five_minute: Option<f64>,
    pub fifteen_minute: Option<f64>,
    pub mean: Option<f64>,
    pub count: Option<f64>,
}

impl RateStats {
    pub fn from_reading(reading: &MBeanReading) -> Self {
        let field = |name: &str| field_value(reading, name).ok();
        Self {
            one_minute: field("OneMinuteRate"),
            five_minute: field("FiveMinuteRate"),
            fifteen_minute: field("FifteenMinuteRate"),
            mean: field("MeanRate"),
            count: field("Count"),
        }
    }

    /// `rate_type` label and value of each rate
    pub fn rates(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("one_minute", self.one_minute),
            ("five_minute", self.five_minute),
            ("fifteen_minute", self.fifteen_minute),
            ("mean", self.mean),
        ]
    }
}
