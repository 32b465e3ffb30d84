//! Numeric extraction from untyped PuppetDB payloads
//!
//! [`coerce`] turns single JSON scalars into floats, [`mbean`] locates the
//! number inside a JMX read, and [`stats`] splits timer and meter beans into
//! their individual fields.

mod coerce;
mod mbean;
mod stats;

pub use coerce::{coerce_f64, coerce_flag, parse_numeric_str};
pub use mbean::{
    extract_value, field_value, path_value, remote_error, BeanFamily, MBeanReading, Probe,
    PROBE_ORDER,
};
pub use stats::{HistogramStats, RateStats};
