//! HTTP utilities for NSX-T REST API calls

use crate::config::ConnectionConfig;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Certificate, Client, Method};
use serde_json::Value;
use std::net::SocketAddr;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Returned when certificate validation is requested without a CA file
pub const NO_CERT_MESSAGE: &str =
    "No certificate path specified. Please specify certificate path in cert parameter";

/// Errors from a single NSX-T API call
#[derive(Debug, thiserror::Error)]
pub enum NsxtError {
    /// Non-2xx response; `message` is already the user-facing text
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("SSL Error occurred while calling NSX-T API {url}.Please check if the certificate is valid and hostname matches certificate common name.")]
    Tls {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error occurred while calling NSX-T API {url}. Please check logs for more details.")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse response from NSX-T API {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Client could not be built from the connection settings
    #[error("{0}")]
    Config(String),

    /// Request input rejected before anything was sent
    #[error("{0}")]
    InvalidInput(String),
}

impl NsxtError {
    /// HTTP status for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            NsxtError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Sanitize response body for logging
/// Truncates long responses and drops control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Pick the message for a failed call: `error_message` from a JSON body,
/// the raw body when it is not JSON, else the generic text.
pub fn extract_error_message(body: &str, url: &str) -> String {
    let generic = || {
        format!(
            "Error occurred while calling NSX-T API {}. Please check logs for more details.",
            url
        )
    };

    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("error_message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generic),
        Err(_) if !body.trim().is_empty() => body.to_string(),
        Err(_) => generic(),
    }
}

/// Walk the source chain looking for a certificate or handshake failure
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = err.source();
    }
    false
}

fn classify_send_error(error: reqwest::Error, url: &str) -> NsxtError {
    if is_tls_error(&error) {
        tracing::error!("TLS failure calling {}: {}", url, error);
        NsxtError::Tls {
            url: url.to_string(),
            source: error,
        }
    } else {
        tracing::error!("Request to {} failed: {}", url, error);
        NsxtError::Transport {
            url: url.to_string(),
            source: error,
        }
    }
}

/// Split `host[:port]` into host and an optional port
pub(crate) fn split_host_port(hostname: &str) -> (&str, Option<u16>) {
    match hostname.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (hostname, None),
        },
        _ => (hostname, None),
    }
}

async fn resolve_manager_addr(hostname: &str) -> Result<SocketAddr, NsxtError> {
    let (host, port) = split_host_port(hostname);
    let mut addrs = tokio::net::lookup_host((host, port.unwrap_or(443)))
        .await
        .map_err(|e| NsxtError::Config(format!("Failed to resolve {}: {}", host, e)))?;
    addrs
        .next()
        .ok_or_else(|| NsxtError::Config(format!("No address found for {}", host)))
}

/// HTTP client wrapper for NSX-T API calls
#[derive(Clone)]
pub struct NsxtHttpClient {
    client: Client,
    username: String,
    password: String,
}

impl NsxtHttpClient {
    /// Build a client honoring the TLS settings of the connection
    pub async fn new(config: &ConnectionConfig) -> Result<Self, NsxtError> {
        let mut builder = Client::builder().user_agent(format!("vmstate/{}", crate::VERSION));

        if config.verify_ssl {
            let Some(cert_path) = config.cert.as_ref() else {
                return Err(NsxtError::Config(NO_CERT_MESSAGE.to_string()));
            };
            let pem = tokio::fs::read(cert_path).await.map_err(|e| {
                NsxtError::Config(format!(
                    "Failed to read certificate {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                NsxtError::Config(format!(
                    "Invalid certificate {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(certificate);

            if let Some(common_name) = config.cert_common_name.as_deref() {
                let addr = resolve_manager_addr(&config.hostname).await?;
                tracing::debug!("Resolving {} to {}", common_name, addr);
                builder = builder.resolve(common_name, addr);
            }
        } else {
            tracing::warn!("Certificate validation disabled for {}", config.hostname);
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| NsxtError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Issue one call; `Ok(None)` means a successful empty body
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, NsxtError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| NsxtError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        if !status.is_success() {
            tracing::error!("NSX-T API error: {} - {}", status, sanitize_for_log(&text));
            return Err(NsxtError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text, url),
            });
        }

        tracing::info!("Response status code: {}", status);

        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| NsxtError::Decode {
                url: url.to_string(),
                source,
            })
    }
}
