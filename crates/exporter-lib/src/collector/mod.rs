//! Scrape orchestration
//!
//! [`ScrapeCycle`] fetches every PuppetDB endpoint once and republishes the
//! metric snapshot; [`ScrapeLoop`] repeats it on a fixed interval. The MBean
//! groups of the core and JVM domains live in [`groups`].

mod cycle;
pub mod groups;
mod r#loop;


pub use cycle::{
    classify_node, endpoints, CycleReport, EndpointFailure, ReportTime, ScrapeCycle, UNREPORTED,
};
pub use groups::{BeanReadings, CoreGroup};
pub use r#loop::{ScrapeConfig, ScrapeLoop, ScrapeLoopBuilder};

use crate::error::ConfigError;
use std::time::Duration;

/// Parse a duration string such as `15s`, `90m` or `1h30m`
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::InvalidDuration {
        value: raw.to_string(),
        source,
    })
}
