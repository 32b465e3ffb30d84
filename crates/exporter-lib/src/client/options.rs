//! Connection options for the PuppetDB client

use crate::error::ConfigError;
use reqwest::{Certificate, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// How to reach PuppetDB
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL, `http` or `https`
    pub url: String,
    /// Client certificate (PEM), required for `https`
    pub cert_path: Option<PathBuf>,
    /// Client private key (PEM), required for `https`
    pub key_path: Option<PathBuf>,
    /// CA bundle (PEM), required for `https`
    pub ca_path: Option<PathBuf>,
    /// Accept any server certificate
    pub ssl_skip_verify: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            cert_path: None,
            key_path: None,
            ca_path: None,
            ssl_skip_verify: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    /// Parse the base URL and check its scheme
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Build the HTTP client; `https` loads the client identity and CA bundle
    pub(crate) fn http_client(&self, base_url: &Url) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);

        if base_url.scheme() == "https" {
            let cert_path = required(&self.cert_path, "client certificate")?;
            let key_path = required(&self.key_path, "client key")?;
            let ca_path = required(&self.ca_path, "CA certificate")?;

            let mut identity_pem = read_material(cert_path, "client certificate")?;
            identity_pem.push(b'\n');
            identity_pem.extend(read_material(key_path, "client key")?);
            let identity = Identity::from_pem(&identity_pem).map_err(|source| {
                ConfigError::InvalidTls {
                    what: "client certificate/key pair",
                    source,
                }
            })?;

            let ca = Certificate::from_pem(&read_material(ca_path, "CA certificate")?)
                .map_err(|source| ConfigError::InvalidTls {
                    what: "CA certificate",
                    source,
                })?;

            builder = builder
                .identity(identity)
                .add_root_certificate(ca)
                .danger_accept_invalid_certs(self.ssl_skip_verify);
        }

        builder.build().map_err(ConfigError::HttpClient)
    }
}

fn required<'a>(path: &'a Option<PathBuf>, what: &'static str) -> Result<&'a Path, ConfigError> {
    path.as_deref().ok_or(ConfigError::MissingTlsMaterial(what))
}

fn read_material(path: &Path, what: &'static str) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::TlsMaterial {
        what,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: &str) -> ClientOptions {
        ClientOptions {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_options() {
        let opts = ClientOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = options("ftp://puppetdb:8080").base_url().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(ref s) if s == "ftp"));
        assert_eq!(err.to_string(), "ftp is not a valid http scheme");
    }

    #[test]
    fn test_rejects_malformed_url() {
        let err = options("not a url").base_url().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_https_requires_client_certificate() {
        let opts = options("https://puppetdb:8081");
        let url = opts.base_url().unwrap();
        let err = opts.http_client(&url).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTlsMaterial("client certificate")));
    }

    #[test]
    fn test_https_reports_unreadable_material() {
        let opts = ClientOptions {
            cert_path: Some("/nonexistent/cert.pem".into()),
            key_path: Some("/nonexistent/key.pem".into()),
            ca_path: Some("/nonexistent/ca.pem".into()),
            ..options("https://puppetdb:8081")
        };
        let url = opts.base_url().unwrap();
        let err = opts.http_client(&url).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TlsMaterial {
                what: "client certificate",
                ..
            }
        ));
    }

    #[test]
    fn test_http_builds_without_tls_material() {
        let opts = options("http://puppetdb:8080");
        let url = opts.base_url().unwrap();
        assert!(opts.http_client(&url).is_ok());
    }
}
