use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::models::{
    DownloadAcceptance, DownloadFileBody, DownloadStatusBody, DownloadStatusResponse, LoginBody,
    LoginResponse,
};
use crate::domain::{BackendConfig, Credentials};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Invalid backend URL: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Backend answered with status {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// The two operations the message broker relays.
///
/// Each call is a single attempt: no retries, no timeout beyond the
/// transport's own, no cancellation.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn submit_download(
        &self,
        source_url: &str,
        credentials: &Credentials,
        config: &BackendConfig,
    ) -> Result<DownloadAcceptance>;

    async fn query_status(
        &self,
        download_id: &str,
        credentials: &Credentials,
        config: &BackendConfig,
    ) -> Result<DownloadStatusResponse>;
}

#[derive(Clone, Default)]
pub struct BackendClient {
    http: Client,
}

impl BackendClient {
    pub fn new() -> Self {
        Self::with_http_client(Client::new())
    }

    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    /// Build `{origin}{path}?apiKey=..[&jwt=..]`.
    ///
    /// Only the origin of the configured URL is kept, any path on it is
    /// dropped.
    fn endpoint(
        config: &BackendConfig,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Url> {
        let base = Url::parse(&config.backend_base_url)
            .map_err(|e| BackendError::Config(format!("{}: {}", config.backend_base_url, e)))?;

        let origin = base.origin();
        if !origin.is_tuple() {
            return Err(BackendError::Config(format!(
                "{}: URL has no usable origin",
                config.backend_base_url
            )));
        }

        let mut url = Url::parse(&origin.ascii_serialization())
            .map_err(|e| BackendError::Config(format!("{}: {}", config.backend_base_url, e)))?;
        url.set_path(path);

        if let Some(credentials) = credentials {
            let mut query = url.query_pairs_mut();
            query.append_pair("apiKey", &credentials.api_key);
            if let Some(token) = credentials.session_token() {
                query.append_pair("jwt", token);
            }
        }

        Ok(url)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// Liveness probe against `GET /api/health`
    pub async fn health_check(&self, config: &BackendConfig) -> Result<Value> {
        let url = Self::endpoint(config, "/api/health", None)?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// Exchange username/password for a session token
    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        api_key: &str,
        config: &BackendConfig,
    ) -> Result<String> {
        let url = Self::endpoint(config, "/api/auth/login", Some(&Credentials::new(api_key)))?;

        let response = self
            .http
            .post(url)
            .json(&LoginBody { username, password })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        login
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("response does not contain a token".into()))
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn submit_download(
        &self,
        source_url: &str,
        credentials: &Credentials,
        config: &BackendConfig,
    ) -> Result<DownloadAcceptance> {
        let url = Self::endpoint(config, "/api/downloadFile", Some(credentials))?;
        let body = self.post_json(url, &DownloadFileBody::audio(source_url)).await?;

        Ok(DownloadAcceptance(unwrap_download(body)))
    }

    async fn query_status(
        &self,
        download_id: &str,
        credentials: &Credentials,
        config: &BackendConfig,
    ) -> Result<DownloadStatusResponse> {
        let url = Self::endpoint(config, "/api/download", Some(credentials))?;
        let body = self
            .post_json(url, &DownloadStatusBody { download_uid: download_id })
            .await?;

        serde_json::from_value(unwrap_download(body))
            .map_err(|e| BackendError::InvalidResponse(format!("Unexpected status shape: {}", e)))
    }
}

/// `{"download": X}` becomes `X`; anything else is returned as is.
fn unwrap_download(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("download").is_some_and(|d| !d.is_null()) => {
            map.remove("download").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const VIDEO: &str = "https://www.youtube.com/watch?v=abc";

    #[tokio::test]
    async fn test_submit_download_posts_audio_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/downloadFile")
            .match_query(Matcher::Exact("apiKey=k1".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "url": VIDEO,
                "type": "audio",
                "customArgs": null,
                "maxBitrate": null
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"download":{"uid":"d1"}}"#)
            .expect(1)
            .create_async()
            .await;

        let acceptance = BackendClient::new()
            .submit_download(VIDEO, &Credentials::new("k1"), &BackendConfig::new(server.url()))
            .await
            .unwrap();

        assert_eq!(acceptance.0, json!({ "uid": "d1" }));
        assert_eq!(acceptance.download_id(), Some("d1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_session_token_and_origin_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/downloadFile")
            .match_query(Matcher::Exact("apiKey=k1&jwt=t1".into()))
            .with_status(200)
            .with_body(r#"{"uid":"d2","running":true}"#)
            .expect(1)
            .create_async()
            .await;

        let credentials = Credentials::new("k1").with_session_token("t1");
        let config = BackendConfig::new(format!("{}/ignored/path", server.url()));
        let acceptance = BackendClient::new()
            .submit_download(VIDEO, &credentials, &config)
            .await
            .unwrap();

        assert_eq!(acceptance.0, json!({ "uid": "d2", "running": true }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_backend_url_never_hits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

        let client = BackendClient::new();
        let credentials = Credentials::new("k1");
        let config = BackendConfig::new("not-a-url");

        let submit = client.submit_download(VIDEO, &credentials, &config).await;
        assert!(matches!(submit, Err(BackendError::Config(_))));

        let status = client.query_status("d1", &credentials, &config).await;
        assert!(matches!(status, Err(BackendError::Config(_))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_status_unwraps_and_is_repeatable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/download")
            .match_query(Matcher::Exact("apiKey=k1".into()))
            .match_body(Matcher::Json(json!({ "download_uid": "d1" })))
            .with_status(200)
            .with_body(
                r#"{"download":{"uid":"d1","finished":false,"running":true,"percent_complete":12.5,"type":"audio","url":"https://www.youtube.com/watch?v=abc"}}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let client = BackendClient::new();
        let credentials = Credentials::new("k1");
        let config = BackendConfig::new(server.url());

        let first = client.query_status("d1", &credentials, &config).await.unwrap();
        let second = client.query_status("d1", &credentials, &config).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.uid, "d1");
        assert_eq!(first.percent_complete, 12.5);
        assert!(!first.finished);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_status_without_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/download")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"uid":"d1","finished":true}"#)
            .create_async()
            .await;

        let status = BackendClient::new()
            .query_status("d1", &Credentials::new("k1"), &BackendConfig::new(server.url()))
            .await
            .unwrap();

        assert!(status.finished);
        assert_eq!(status.uid, "d1");
    }

    #[tokio::test]
    async fn test_running_status_with_string_percent_parses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/download")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"download":{"uid":"d1","finished":false,"running":true,"percent_complete":"45.20","type":"audio_only","url":"https://www.youtube.com/watch?v=abc"}}"#,
            )
            .create_async()
            .await;

        let status = BackendClient::new()
            .query_status("d1", &Credentials::new("k1"), &BackendConfig::new(server.url()))
            .await
            .unwrap();

        assert!(!status.has_error());
        assert!(!status.finished);
        assert!(status.running);
        assert_eq!(status.percent_complete, 45.2);
        assert_eq!(status.media_kind, None);
    }

    #[tokio::test]
    async fn test_error_status_codes_still_parse_json() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/download")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error":"x"}"#)
            .create_async()
            .await;

        let status = BackendClient::new()
            .query_status("d1", &Credentials::new("k1"), &BackendConfig::new(server.url()))
            .await
            .unwrap();

        assert!(status.has_error());
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/downloadFile")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let result = BackendClient::new()
            .submit_download(VIDEO, &Credentials::new("k1"), &BackendConfig::new(server.url()))
            .await;

        assert!(matches!(result, Err(BackendError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_request_error() {
        let result = BackendClient::new()
            .submit_download(
                VIDEO,
                &Credentials::new("k1"),
                &BackendConfig::new("http://127.0.0.1:1"),
            )
            .await;

        assert!(matches!(result, Err(BackendError::RequestError(_))));
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let health = BackendClient::new()
            .health_check(&BackendConfig::new(server.url()))
            .await
            .unwrap();
        assert_eq!(health, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_health_check_down() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health")
            .with_status(503)
            .create_async()
            .await;

        let result = BackendClient::new()
            .health_check(&BackendConfig::new(server.url()))
            .await;
        assert!(matches!(result, Err(BackendError::Status(503))));
    }

    #[tokio::test]
    async fn test_login_returns_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/login")
            .match_query(Matcher::Exact("apiKey=k1".into()))
            .match_body(Matcher::Json(json!({ "username": "admin", "password": "pw" })))
            .with_status(200)
            .with_body(r#"{"token":"t1","user":{"name":"admin"}}"#)
            .expect(1)
            .create_async()
            .await;

        let token = BackendClient::new()
            .login(Some("admin"), Some("pw"), "k1", &BackendConfig::new(server.url()))
            .await
            .unwrap();

        assert_eq!(token, "t1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({ "username": "nobody" })))
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/login")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({ "username": "admin" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = BackendClient::new();
        let config = BackendConfig::new(server.url());

        let denied = client.login(Some("nobody"), Some("pw"), "k1", &config).await;
        assert!(matches!(denied, Err(BackendError::Status(401))));

        let tokenless = client.login(Some("admin"), Some("pw"), "k1", &config).await;
        assert!(matches!(tokenless, Err(BackendError::InvalidResponse(_))));
    }

    #[test]
    fn test_unwrap_download() {
        assert_eq!(unwrap_download(json!({ "download": { "uid": "d1" } })), json!({ "uid": "d1" }));
        assert_eq!(unwrap_download(json!({ "uid": "d1" })), json!({ "uid": "d1" }));
        assert_eq!(
            unwrap_download(json!({ "download": null, "uid": "d1" })),
            json!({ "download": null, "uid": "d1" })
        );
    }
}
