//! HTTP client for the control plane REST API.
//!
//! Every control plane call made by the lifecycle controller goes through
//! `ControlPlaneClient::send`. The HTTP implementation attaches the standard
//! headers, classifies failures and decodes JSON bodies; callers only see a
//! decoded `serde_json::Value` or a `ControlError`.

use std::time::Duration;

use async_trait::async_trait;
use dcscale_auth::{SessionToken, CLIENT_ID_HEADER};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;

use crate::error::{ControlError, Result};

/// Header carrying the session token on authenticated requests.
pub const AUTH_TOKEN_HEADER: &str = "X-SS-User-Auth-Token";

/// A single control plane request, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path starting with `/`, e.g. `/jobrunner/rest/v1/jobs/syncJobs`.
    pub path: String,
    /// Query parameters, encoded by the client.
    pub query: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Build a request without a body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// A `PUT` request with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Trait for control plane communication.
///
/// This trait abstracts the transport, allowing for scripted
/// implementations in tests.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Send an authenticated request.
    ///
    /// Returns `Ok(None)` when the response has an empty body.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Api` for any non-2xx status,
    /// `ControlError::Transport` if the request cannot be delivered and
    /// `ControlError::Decode` if the body is not JSON.
    async fn send(&self, token: &SessionToken, request: ApiRequest) -> Result<Option<Value>>;
}

/// HTTP client for the control plane.
#[derive(Debug, Clone)]
pub struct HttpControlPlaneClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl HttpControlPlaneClient {
    /// Create a new control plane client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the control plane (e.g., "https://control.example.com")
    /// * `client_id` - Value for the `X-Requested-By` header
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ControlError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url, client_id))
    }

    /// Create a new control plane client with a custom reqwest client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    /// Get the base URL of the control plane.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlaneClient {
    async fn send(&self, token: &SessionToken, request: ApiRequest) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json")
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(AUTH_TOKEN_HEADER, token.expose());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ControlError::Transport(format!("{} {}: {e}", request.method, request.path)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ControlError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::error!(
                method = %request.method,
                path = %request.path,
                status = %status,
                "Control plane request failed"
            );
            return Err(ControlError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = %status,
            "Control plane request succeeded"
        );

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ControlError::Decode(format!("{} {}: {e}", request.method, request.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> SessionToken {
        SessionToken::new("session-abc").unwrap()
    }

    fn client(server: &MockServer) -> HttpControlPlaneClient {
        HttpControlPlaneClient::new(server.uri(), "SDC", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn http_client_creation() {
        let client =
            HttpControlPlaneClient::new("http://localhost:18631/", "SDC", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:18631");
    }

    #[test]
    fn request_builders() {
        let request = ApiRequest::get("/jobrunner/rest/v1/jobs")
            .with_query("organization", "acme")
            .with_query("jobLabel", "west");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query.len(), 2);
        assert!(request.body.is_none());

        let request = ApiRequest::post("/x", json!([1]));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(json!([1])));
    }

    #[tokio::test]
    async fn attaches_standard_headers_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jobrunner/rest/v1/jobs/syncJobs"))
            .and(header("X-SS-User-Auth-Token", "session-abc"))
            .and(header("X-Requested-By", "SDC"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!(["job-1"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value = client(&server)
            .send(
                &token(),
                ApiRequest::post("/jobrunner/rest/v1/jobs/syncJobs", json!(["job-1"])),
            )
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn empty_body_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/jobrunner/rest/v1/sdc/node-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let value = client(&server)
            .send(&token(), ApiRequest::delete("/jobrunner/rest/v1/sdc/node-1"))
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn query_parameters_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobrunner/rest/v1/jobs"))
            .and(query_param("organization", "acme"))
            .and(query_param("jobLabel", "west coast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let request = ApiRequest::get("/jobrunner/rest/v1/jobs")
            .with_query("organization", "acme")
            .with_query("jobLabel", "west coast");
        let value = client(&server).send(&token(), request).await.unwrap();
        assert_eq!(value, Some(json!([])));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(&token(), ApiRequest::get("/anything"))
            .await
            .unwrap_err();
        match err {
            ControlError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal failure");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(&token(), ApiRequest::get("/anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client =
            HttpControlPlaneClient::new("http://127.0.0.1:1", "SDC", Duration::from_secs(1))
                .unwrap();
        let err = client
            .send(&token(), ApiRequest::get("/anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Transport(_)));
    }
}
