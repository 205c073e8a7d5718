//! NSX-T Client
//!
//! Main client for interacting with one NSX-T manager, combining the
//! HTTP transport with the manager base URL.

use super::http::{split_host_port, NsxtError, NsxtHttpClient};
use crate::config::ConnectionConfig;
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// Main NSX-T client
#[derive(Clone)]
pub struct NsxtClient {
    pub http: NsxtHttpClient,
    base_url: String,
}

impl NsxtClient {
    /// Create a client for the manager named in the connection settings
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, NsxtError> {
        let http = NsxtHttpClient::new(config).await?;
        let base_url = manager_base_url(config)?;
        tracing::debug!("NSX-T manager base URL: {}", base_url);
        Ok(Self { http, base_url })
    }

    /// Create a client against an explicit base URL such as `http://127.0.0.1:8080`
    pub fn with_base_url(base_url: &str, http: NsxtHttpClient) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build Policy API URL
    pub fn policy_url(&self, path: &str) -> String {
        format!("{}/policy/api/v1{}", self.base_url, path)
    }

    /// Build Manager API URL
    pub fn manager_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    pub async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Option<Value>, NsxtError> {
        self.http.request(Method::GET, url, query, None).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Option<Value>, NsxtError> {
        self.http.request(Method::POST, url, &[], Some(body)).await
    }

    pub async fn put(&self, url: &str, body: &Value) -> Result<Option<Value>, NsxtError> {
        self.http.request(Method::PUT, url, &[], Some(body)).await
    }

    pub async fn patch(&self, url: &str, body: &Value) -> Result<Option<Value>, NsxtError> {
        self.http.request(Method::PATCH, url, &[], Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Option<Value>, NsxtError> {
        self.http.request(Method::DELETE, url, &[], None).await
    }
}

/// `https://<host>[:port]`, addressed to the certificate common name when one is set
fn manager_base_url(config: &ConnectionConfig) -> Result<String, NsxtError> {
    let (host, port) = split_host_port(&config.hostname);
    let host = match config.cert_common_name.as_deref() {
        Some(common_name) if config.verify_ssl => common_name,
        _ => host,
    };
    let authority = match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let url = Url::parse(&format!("https://{}", authority)).map_err(|e| {
        NsxtError::Config(format!("Invalid NSX-T hostname {}: {}", config.hostname, e))
    })?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}
