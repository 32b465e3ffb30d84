//! PuppetDB API client
//!
//! [`PuppetDbSource`] is the seam between the scrape loop and the network:
//! the loop only sees decoded nodes, services and raw MBean readings.
//! [`PuppetDbClient`] implements it over HTTP. Calls are issued one at a time
//! by the caller; the client holds no per-request state.

mod options;

#[cfg(test)]
mod tests;

pub use options::ClientOptions;

use crate::error::{ClientError, ConfigError};
use crate::extract::MBeanReading;
use crate::metrics::PerformanceMetrics;
use crate::models::{MetricsV2Response, Node, ReportMetric, ServiceStatus};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Node query selecting active and deactivated nodes alike
pub const NODES_QUERY: &str =
    r#"["or", ["=", ["node", "active"], false], ["=", ["node", "active"], true]]"#;

/// API paths, relative to the base URL
pub mod endpoints {
    pub const NODES: &str = "/pdb/query/v4/nodes";
    pub const REPORTS: &str = "/pdb/query/v4/reports";
    pub const SERVICES: &str = "/status/v1/services";
    pub const METRICS_V2: &str = "/metrics/v2";
    pub const METRICS_READ: &str = "/metrics/v2/read";
    pub const METRICS_LIST: &str = "/metrics/v2/list";

    /// Route label for report metric requests; the hash is left out
    pub const REPORT_METRICS_ROUTE: &str = "/pdb/query/v4/reports/metrics";

    pub fn report_metrics(report_hash: &str) -> String {
        format!("{REPORTS}/{report_hash}/metrics")
    }
}

/// Source of PuppetDB data for one scrape cycle
#[async_trait]
pub trait PuppetDbSource: Send + Sync {
    /// All nodes, active or not
    async fn nodes(&self) -> Result<Vec<Node>, ClientError>;

    /// Counters of one report
    async fn report_metrics(&self, report_hash: &str) -> Result<Vec<ReportMetric>, ClientError>;

    /// Service status keyed by service name
    async fn services(&self) -> Result<HashMap<String, ServiceStatus>, ClientError>;

    async fn metrics_v2(&self) -> Result<MetricsV2Response, ClientError>;

    /// Read one MBean
    async fn read_mbean(&self, mbean: &str) -> Result<MBeanReading, ClientError>;

    /// Read several MBeans in one request.
    ///
    /// The result has one entry per requested name, in request order. An
    /// entry the server answered with something other than an object is
    /// empty.
    async fn read_mbeans_bulk(&self, mbeans: &[String]) -> Result<Vec<MBeanReading>, ClientError>;

    /// Names of the MBeans the server can read
    async fn list_mbeans(&self) -> Result<Vec<String>, ClientError>;
}

/// HTTP implementation of [`PuppetDbSource`]
#[derive(Clone)]
pub struct PuppetDbClient {
    http: reqwest::Client,
    base_url: Url,
    telemetry: Option<PerformanceMetrics>,
}

impl PuppetDbClient {
    pub fn new(options: &ClientOptions) -> Result<Self, ConfigError> {
        let base_url = options.base_url()?;
        let http = options.http_client(&base_url)?;

        Ok(Self {
            http,
            base_url,
            telemetry: None,
        })
    }

    /// Record request durations and outcomes into `metrics`
    pub fn with_telemetry(mut self, metrics: PerformanceMetrics) -> Self {
        self.telemetry = Some(metrics);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append `endpoint` to the base URL with exactly one `/` between them
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');

        Url::parse(&format!("{base}/{path}")).map_err(|e| ClientError::InvalidRequest {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, route: &str) -> Result<T, ClientError> {
        let body = self.execute(self.http.get(url), route, "GET").await?;
        decode(route, &body)
    }

    async fn post_json(&self, route: &str, payload: &Value) -> Result<Value, ClientError> {
        let url = self.endpoint_url(route)?;
        let request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string());

        let body = self.execute(request, route, "POST").await?;
        decode(route, &body)
    }

    /// Send `request` and return the body of a successful response
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        route: &str,
        method: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let start = Instant::now();
        let result = request.send().await;

        if let Some(telemetry) = &self.telemetry {
            let status = match &result {
                Ok(response) => response.status().as_str().to_string(),
                Err(_) => "error".to_string(),
            };
            telemetry.record_request(route, method, &status, start.elapsed());
        }

        let response = result.map_err(|source| ClientError::Transport {
            endpoint: route.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: route.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| ClientError::Transport {
            endpoint: route.to_string(),
            source,
        })?;
        debug!(endpoint = %route, bytes = body.len(), "PuppetDB response received");

        Ok(body.to_vec())
    }
}

#[async_trait]
impl PuppetDbSource for PuppetDbClient {
    async fn nodes(&self) -> Result<Vec<Node>, ClientError> {
        let mut url = self.endpoint_url(endpoints::NODES)?;
        url.query_pairs_mut().append_pair("query", NODES_QUERY);
        self.get(url, endpoints::NODES).await
    }

    async fn report_metrics(&self, report_hash: &str) -> Result<Vec<ReportMetric>, ClientError> {
        let url = self.endpoint_url(&endpoints::report_metrics(report_hash))?;
        self.get(url, endpoints::REPORT_METRICS_ROUTE).await
    }

    async fn services(&self) -> Result<HashMap<String, ServiceStatus>, ClientError> {
        let url = self.endpoint_url(endpoints::SERVICES)?;
        self.get(url, endpoints::SERVICES).await
    }

    async fn metrics_v2(&self) -> Result<MetricsV2Response, ClientError> {
        let url = self.endpoint_url(endpoints::METRICS_V2)?;
        self.get(url, endpoints::METRICS_V2).await
    }

    async fn read_mbean(&self, mbean: &str) -> Result<MBeanReading, ClientError> {
        let response = self
            .post_json(endpoints::METRICS_READ, &json!({ "mbean": mbean }))
            .await?;

        match response {
            Value::Object(reading) => Ok(reading),
            other => Err(ClientError::Decode {
                endpoint: endpoints::METRICS_READ.to_string(),
                reason: format!("expected an object for {mbean}, got {}", json_type(&other)),
            }),
        }
    }

    async fn read_mbeans_bulk(&self, mbeans: &[String]) -> Result<Vec<MBeanReading>, ClientError> {
        if mbeans.is_empty() {
            return Ok(Vec::new());
        }

        let payload: Vec<Value> = mbeans.iter().map(|m| json!({ "mbean": m })).collect();
        let response = self
            .post_json(endpoints::METRICS_READ, &Value::Array(payload))
            .await?;

        let Value::Array(entries) = response else {
            return Err(ClientError::Decode {
                endpoint: endpoints::METRICS_READ.to_string(),
                reason: format!("expected an array for bulk read, got {}", json_type(&response)),
            });
        };

        Ok(align_bulk_response(entries, mbeans.len()))
    }

    async fn list_mbeans(&self) -> Result<Vec<String>, ClientError> {
        let url = self.endpoint_url(endpoints::METRICS_LIST)?;
        let listing: Value = self.get(url, endpoints::METRICS_LIST).await?;
        Ok(mbean_names_from_list(&listing))
    }
}

/// One reading per requested bean, in request order
pub fn align_bulk_response(entries: Vec<Value>, requested: usize) -> Vec<MBeanReading> {
    let mut readings: Vec<MBeanReading> = entries
        .into_iter()
        .take(requested)
        .map(|entry| match entry {
            Value::Object(reading) => reading,
            _ => Map::new(),
        })
        .collect();
    readings.resize_with(requested, Map::new);
    readings
}

/// MBean names from a `/metrics/v2/list` response.
///
/// `value` maps bean domains to their property keys. An empty key stands for
/// the bare domain. Without a `value` object every top-level key except
/// `request` is taken as a name.
pub fn mbean_names_from_list(listing: &Value) -> Vec<String> {
    let Some(root) = listing.as_object() else {
        return Vec::new();
    };

    let Some(domains) = root.get("value").and_then(Value::as_object) else {
        return root.keys().filter(|k| *k != "request").cloned().collect();
    };

    let mut names = Vec::new();
    for (domain, properties) in domains {
        match properties.as_object() {
            Some(properties) => {
                for key in properties.keys() {
                    if key.is_empty() {
                        names.push(domain.clone());
                    } else {
                        names.push(format!("{domain}:{key}"));
                    }
                }
            }
            None => names.push(domain.clone()),
        }
    }
    names
}

fn decode<T: DeserializeOwned>(route: &str, body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|e| ClientError::Decode {
        endpoint: route.to_string(),
        reason: e.to_string(),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
