use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CogniError, IntoCogniError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const GET_FAILED: &str = "GET request failed";
const POST_FAILED: &str = "POST request failed";

/// Error body some endpoints return on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Thin client for the learning platform's REST backend
///
/// Joins a base URL with endpoint paths, attaches a bearer token when one is
/// given and turns non-success responses into `NetworkRequestFailure`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. "http://localhost:5000/api/v1")
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_cogni_err(|e| CogniError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Self::with_client(base_url, client)
    }

    /// Same as `new` but with a caller-built HTTP client
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let parsed = url::Url::parse(&base_url)
            .map_cogni_err(|e| CogniError::Config(format!("Invalid API base URL '{}': {}", base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CogniError::Config(format!(
                "Invalid API base URL: '{}'. Must start with http:// or https://",
                base_url
            )));
        }

        log::info!("API client configured for {}", base_url);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        join_endpoint(&self.base_url, endpoint)
    }

    /// GET `endpoint` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, token: Option<&str>) -> Result<T> {
        let url = self.url_for(endpoint);
        log::debug!("GET {}", url);

        let response = with_token(self.client.get(&url), token).send().await?;
        if !response.status().is_success() {
            log::warn!("GET {} returned {}", url, response.status());
            return Err(CogniError::NetworkRequestFailure(GET_FAILED.to_string()));
        }

        Ok(response.json().await?)
    }

    /// POST `body` as JSON to `endpoint` and decode the JSON reply
    ///
    /// On failure the server's `{"error": "..."}` message is used when present.
    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B, token: Option<&str>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url_for(endpoint);
        log::debug!("POST {}", url);

        let response = with_token(self.client.post(&url).json(body), token)
            .send()
            .await?;
        if !response.status().is_success() {
            log::warn!("POST {} returned {}", url, response.status());
            return Err(CogniError::NetworkRequestFailure(post_error_message(response).await));
        }

        Ok(response.json().await?)
    }
}

/// Join base and endpoint with exactly one slash between them
pub fn join_endpoint(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    }
}

fn with_token(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) if !token.is_empty() => request.bearer_auth(token),
        _ => request,
    }
}

async fn post_error_message(response: Response) -> String {
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(message) }) => message,
        _ => POST_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::mpsc;
    use std::thread;

    struct Seen {
        path: String,
        authorization: Option<String>,
    }

    /// Serve one request with `status` and `body`, reporting what arrived
    fn serve_once(status: u16, body: &'static str) -> (String, mpsc::Receiver<Seen>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                let _ = tx.send(Seen {
                    path: request.url().to_string(),
                    authorization,
                });
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });

        (format!("http://127.0.0.1:{}/api/v1/", port), rx)
    }

    fn local_client(base: &str) -> ApiClient {
        // Keep loopback traffic away from any proxy configured in the environment
        let client = Client::builder().no_proxy().build().unwrap();
        ApiClient::with_client(base, client).unwrap()
    }

    #[test]
    fn test_join_endpoint() {
        assert_eq!(join_endpoint("http://h/api", "courses"), "http://h/api/courses");
        assert_eq!(join_endpoint("http://h/api", "/courses"), "http://h/api/courses");
        assert_eq!(join_endpoint("http://h/api/", "/courses"), "http://h/api/courses");
    }

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new("http://localhost:5000/api/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api/v1");
        assert_eq!(client.url_for("auth/login"), "http://localhost:5000/api/v1/auth/login");
    }

    #[test]
    fn test_invalid_url() {
        assert!(ApiClient::new("invalid-url").is_err());
        assert!(ApiClient::new("ftp://example.org").is_err());
    }

    #[tokio::test]
    async fn test_get_attaches_bearer_token() {
        let (base, seen) = serve_once(200, r#"{"ok":true}"#);
        let client = local_client(&base);

        let body: Value = client.get_json("/courses", Some("abc123")).await.unwrap();
        assert_eq!(body, json!({ "ok": true }));

        let seen = seen.recv().unwrap();
        assert_eq!(seen.path, "/api/v1/courses");
        assert_eq!(seen.authorization.as_deref(), Some("Bearer abc123"));
    }

    #[tokio::test]
    async fn test_get_without_token_sends_no_header() {
        let (base, seen) = serve_once(200, "[]");
        let client = local_client(&base);

        let _: Value = client.get_json("courses", None).await.unwrap();
        assert!(seen.recv().unwrap().authorization.is_none());
    }

    #[tokio::test]
    async fn test_get_failure_is_generic() {
        let (base, _seen) = serve_once(500, r#"{"error":"boom"}"#);
        let client = local_client(&base);

        let err = client.get_json::<Value>("courses", None).await.unwrap_err();
        match err {
            CogniError::NetworkRequestFailure(message) => assert_eq!(message, GET_FAILED),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_failure_uses_error_body() {
        let (base, _seen) = serve_once(400, r#"{"error":"Email already registered"}"#);
        let client = local_client(&base);

        let err = client
            .post_json::<_, Value>("auth/register", &json!({ "email": "a@b.c" }), None)
            .await
            .unwrap_err();
        match err {
            CogniError::NetworkRequestFailure(message) => {
                assert_eq!(message, "Email already registered")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_failure_without_json_body() {
        let (base, _seen) = serve_once(502, "Bad Gateway");
        let client = local_client(&base);

        let err = client
            .post_json::<_, Value>("sync/actions", &json!({}), Some("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, CogniError::NetworkRequestFailure(ref m) if m == POST_FAILED));
    }
}
