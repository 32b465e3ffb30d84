//! Library for the PuppetDB Prometheus exporter
//!
//! This crate provides the core functionality for:
//! - Talking to the PuppetDB query, status and metrics APIs
//! - Extracting numbers from untyped MBean readings
//! - Publishing node, service, core and JVM metrics
//! - The periodic scrape loop
//! - Health checks and observability

pub mod client;
pub mod collector;
pub mod error;
pub mod extract;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;

pub use client::{ClientOptions, PuppetDbClient, PuppetDbSource};
pub use collector::{parse_duration, ScrapeConfig, ScrapeLoop, ScrapeLoopBuilder};
pub use error::{ClientError, ConfigError, ExtractError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metrics::{ExporterMetrics, HealthThresholds};
pub use models::*;
pub use observability::StructuredLogger;
