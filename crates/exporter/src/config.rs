//! Exporter configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file, `PUPPETDB_EXPORTER_*` environment variables, command-line flags.

use crate::api::{HEALTH_PATH, READY_PATH};
use anyhow::{bail, Context, Result};
use clap::Parser;
use exporter_lib::{parse_duration, ClientOptions, ScrapeConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "PUPPETDB_EXPORTER";

/// Prometheus exporter for PuppetDB
#[derive(Debug, Default, Parser)]
#[command(name = "puppetdb-exporter")]
#[command(author, version, about = "Prometheus exporter for PuppetDB", long_about = None)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON, by extension)
    #[arg(long, short, env = "PUPPETDB_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the PuppetDB API
    #[arg(long)]
    pub puppetdb_url: Option<String>,

    /// Client certificate (PEM) for https
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Client private key (PEM) for https
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// CA bundle (PEM) for https
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Accept any server certificate
    #[arg(long)]
    pub ssl_skip_verify: bool,

    /// Address of the metrics and health server
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Path the metrics are served on
    #[arg(long)]
    pub metrics_path: Option<String>,

    /// Time between scrape cycles, e.g. "15s"
    #[arg(long)]
    pub scrape_interval: Option<String>,

    /// Report age after which a node counts as unreported, e.g. "2h"
    #[arg(long)]
    pub unreported_node: Option<String>,

    /// Report metric categories to export, comma separated
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Timeout of a single PuppetDB request, e.g. "30s"
    #[arg(long)]
    pub request_timeout: Option<String>,
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_puppetdb_url")]
    pub puppetdb_url: String,

    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    #[serde(default)]
    pub ssl_skip_verify: bool,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,

    #[serde(default = "default_unreported_node")]
    pub unreported_node: String,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_puppetdb_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:9635".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_scrape_interval() -> String {
    "15s".to_string()
}

fn default_unreported_node() -> String {
    "2h".to_string()
}

fn default_categories() -> Vec<String> {
    ["resources", "time", "changes", "events"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl ExporterConfig {
    /// Load configuration from file, environment and command line
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_env(cli, None)
    }

    /// `env` replaces the process environment when given
    fn load_with_env(cli: &Cli, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("categories")
                    .source(env),
            )
            .set_override_option("puppetdb_url", cli.puppetdb_url.clone())?
            .set_override_option("cert_file", path_string(&cli.cert_file))?
            .set_override_option("key_file", path_string(&cli.key_file))?
            .set_override_option("ca_file", path_string(&cli.ca_file))?
            .set_override_option("ssl_skip_verify", cli.ssl_skip_verify.then_some(true))?
            .set_override_option("listen_address", cli.listen_address.clone())?
            .set_override_option("metrics_path", cli.metrics_path.clone())?
            .set_override_option("scrape_interval", cli.scrape_interval.clone())?
            .set_override_option("unreported_node", cli.unreported_node.clone())?
            .set_override_option("request_timeout", cli.request_timeout.clone())?;

        if !cli.categories.is_empty() {
            builder = builder.set_override("categories", cli.categories.clone())?;
        }

        let config: ExporterConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        self.categories = self
            .categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !self.metrics_path.starts_with('/') {
            self.metrics_path.insert(0, '/');
        }
        if [HEALTH_PATH, READY_PATH].contains(&self.metrics_path.as_str()) {
            bail!(
                "Invalid metrics_path: {} is reserved for health checks",
                self.metrics_path
            );
        }
        Ok(self)
    }

    /// Options for the PuppetDB client; fails on an unparseable timeout
    pub fn client_options(&self) -> Result<ClientOptions> {
        Ok(ClientOptions {
            url: self.puppetdb_url.clone(),
            cert_path: self.cert_file.clone(),
            key_path: self.key_file.clone(),
            ca_path: self.ca_file.clone(),
            ssl_skip_verify: self.ssl_skip_verify,
            timeout: duration("request_timeout", &self.request_timeout)?,
        })
    }

    /// Scrape loop settings; fails on an unparseable duration
    pub fn scrape_config(&self) -> Result<ScrapeConfig> {
        Ok(ScrapeConfig {
            interval: duration("scrape_interval", &self.scrape_interval)?,
            unreported_after: duration("unreported_node", &self.unreported_node)?,
        })
    }
}

fn duration(key: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).with_context(|| format!("Invalid {key}"))
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::load_with_env(&Cli::default(), env(&[])).unwrap();

        assert_eq!(config.puppetdb_url, "http://127.0.0.1:8080");
        assert_eq!(config.listen_address, "0.0.0.0:9635");
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.categories, default_categories());
        assert!(!config.ssl_skip_verify);

        let scrape = config.scrape_config().unwrap();
        assert_eq!(scrape.interval, Duration::from_secs(15));
        assert_eq!(scrape.unreported_after, Duration::from_secs(7200));
        assert_eq!(config.client_options().unwrap().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = ExporterConfig::load_with_env(
            &Cli::default(),
            env(&[
                ("PUPPETDB_EXPORTER_PUPPETDB_URL", "https://puppetdb:8081"),
                ("PUPPETDB_EXPORTER_SSL_SKIP_VERIFY", "true"),
                ("PUPPETDB_EXPORTER_CATEGORIES", "resources, events"),
                ("PUPPETDB_EXPORTER_UNREPORTED_NODE", "90m"),
            ]),
        )
        .unwrap();

        assert_eq!(config.puppetdb_url, "https://puppetdb:8081");
        assert!(config.ssl_skip_verify);
        assert_eq!(config.categories, vec!["resources", "events"]);
        assert_eq!(
            config.scrape_config().unwrap().unreported_after,
            Duration::from_secs(5400)
        );
    }

    #[test]
    fn test_command_line_wins_over_environment() {
        let cli = Cli {
            puppetdb_url: Some("http://cli:8080".into()),
            categories: vec!["time".into()],
            metrics_path: Some("probe".into()),
            ..Default::default()
        };
        let config = ExporterConfig::load_with_env(
            &cli,
            env(&[("PUPPETDB_EXPORTER_PUPPETDB_URL", "http://env:8080")]),
        )
        .unwrap();

        assert_eq!(config.puppetdb_url, "http://cli:8080");
        assert_eq!(config.categories, vec!["time"]);
        assert_eq!(config.metrics_path, "/probe");
    }

    #[test]
    fn test_config_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "scrape_interval = \"1m\"").unwrap();
        writeln!(file, "categories = [\"changes\"]").unwrap();

        let cli = Cli {
            config: Some(path.clone()),
            ..Default::default()
        };
        let config = ExporterConfig::load_with_env(&cli, env(&[])).unwrap();

        assert_eq!(config.scrape_config().unwrap().interval, Duration::from_secs(60));
        assert_eq!(config.categories, vec!["changes"]);
    }

    #[test]
    fn test_invalid_duration_is_fatal() {
        let cli = Cli {
            unreported_node: Some("soon".into()),
            ..Default::default()
        };
        let config = ExporterConfig::load_with_env(&cli, env(&[])).unwrap();

        let err = config.scrape_config().unwrap_err();
        assert!(format!("{err:#}").contains("unreported_node"));
    }

    #[test]
    fn test_metrics_path_cannot_shadow_health_checks() {
        for path in ["/healthz", "readyz"] {
            let cli = Cli {
                metrics_path: Some(path.into()),
                ..Default::default()
            };
            let err = ExporterConfig::load_with_env(&cli, env(&[])).unwrap_err();
            assert!(format!("{err:#}").contains("reserved"), "{path}");
        }
    }

    #[test]
    fn test_cli_parses_category_list() {
        let cli = Cli::parse_from([
            "puppetdb-exporter",
            "--categories",
            "resources,time",
            "--ssl-skip-verify",
        ]);
        assert_eq!(cli.categories, vec!["resources", "time"]);
        assert!(cli.ssl_skip_verify);
    }
}
