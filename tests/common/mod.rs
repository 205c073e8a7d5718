//! Shared helpers for tests against a mocked NSX-T manager

#![allow(dead_code)]

use vmstate::config::ConnectionConfig;
use vmstate::nsxt::{NsxtClient, NsxtHttpClient};
use wiremock::MockServer;

/// `admin:secret` as a basic auth header value
pub const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

pub fn connection(hostname: &str) -> ConnectionConfig {
    ConnectionConfig {
        hostname: hostname.to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        cert: None,
        cert_common_name: None,
        verify_ssl: false,
    }
}

/// Client whose base URL is the mock server
pub async fn client(server: &MockServer) -> NsxtClient {
    let http = NsxtHttpClient::new(&connection("127.0.0.1"))
        .await
        .expect("client should build without verification");
    NsxtClient::with_base_url(&server.uri(), http)
}
