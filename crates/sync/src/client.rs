//! REST client for the hosted record store.
//!
//! Speaks the PostgREST dialect: one path per table under `/rest/v1`,
//! `column=eq.value` filters and `Prefer` headers for write responses.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use crate::types::{ListFilter, Resource};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const REST_PREFIX: &str = "rest/v1";

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_connect() || err.is_timeout() {
        RemoteError::unreachable(err.to_string())
    } else {
        RemoteError::Http(err)
    }
}

/// Client for the hosted journal backend.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RemoteClient {
    /// Create a client for `base_url` (the project root, e.g. `https://xyz.example.co`).
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(&format!("{}/", trimmed))
            .map_err(|e| RemoteError::invalid_request(format!("Invalid remote URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::invalid_request(format!(
                "Unsupported remote URL scheme: {}",
                parsed.scheme()
            )));
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RemoteError::invalid_request("Remote API key is empty"));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[JournalSync] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[JournalSync] API response error ({}): {}", status, preview);
    }

    fn table_url(&self, resource: Resource) -> Result<Url> {
        self.base_url
            .join(&format!("{}/{}", REST_PREFIX, resource.table_name()))
            .map_err(|e| RemoteError::invalid_request(format!("Invalid table URL: {}", e)))
    }

    /// Create headers for an API request.
    fn headers(&self, prefer: Option<&'static str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(&self.api_key)
            .map_err(|_| RemoteError::invalid_request("Invalid API key format"))?;
        headers.insert(HeaderName::from_static("apikey"), key_value);

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| RemoteError::invalid_request("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(prefer) = prefer {
            headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static(prefer));
        }

        Ok(headers)
    }

    /// Read the body and turn non-2xx statuses into [`RemoteError::Api`].
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(body);
        }

        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            let message = match (error.message, error.details) {
                (Some(message), Some(details)) => format!("{} ({})", message, details),
                (Some(message), None) => message,
                (None, Some(details)) => details,
                (None, None) => format!("Request failed: {}", body),
            };
            return Err(RemoteError::api(status.as_u16(), error.code, message));
        }
        Err(RemoteError::api(
            status.as_u16(),
            None,
            format!("Request failed: {}", body),
        ))
    }

    async fn parse_rows(response: reqwest::Response) -> Result<Vec<Value>> {
        let body = Self::read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(row @ Value::Object(_)) => Ok(vec![row]),
            Ok(other) => Err(RemoteError::invalid_response(format!(
                "Expected rows, got {}",
                other
            ))),
            Err(e) => {
                log::error!(
                    "[JournalSync] Failed to deserialize response. Body: {}, Error: {}",
                    body,
                    e
                );
                Err(RemoteError::Json(e))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    /// GET /rest/v1/{table}?{column}=eq.{value}
    async fn list(&self, resource: Resource, filter: &ListFilter) -> Result<Vec<Value>> {
        let url = self.table_url(resource)?;
        debug!(
            "[JournalSync] Listing {} with {} condition(s)",
            resource.table_name(),
            filter.conditions().len()
        );

        let response = self
            .client
            .get(url)
            .headers(self.headers(None)?)
            .query(&filter.to_query())
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse_rows(response).await
    }

    async fn get_by_id(&self, resource: Resource, id: &str) -> Result<Option<Value>> {
        let filter = ListFilter::eq("id", id).limit(1);
        Ok(self.list(resource, &filter).await?.into_iter().next())
    }

    /// POST /rest/v1/{table}
    async fn insert(&self, resource: Resource, row: Value) -> Result<Value> {
        let url = self.table_url(resource)?;
        debug!("[JournalSync] Inserting into {}", resource.table_name());

        let response = self
            .client
            .post(url)
            .headers(self.headers(Some("return=representation"))?)
            .json(&row)
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::invalid_response("Insert returned no representation"))
    }

    /// PATCH /rest/v1/{table}?id=eq.{id}
    async fn update(&self, resource: Resource, id: &str, patch: Value) -> Result<()> {
        let url = self.table_url(resource)?;
        debug!("[JournalSync] Updating {} row {}", resource.table_name(), id);

        let response = self
            .client
            .patch(url)
            .headers(self.headers(Some("return=minimal"))?)
            .query(&[("id", format!("eq.{}", id))])
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_body(response).await.map(|_| ())
    }

    /// DELETE /rest/v1/{table}?id=eq.{id}
    async fn delete(&self, resource: Resource, id: &str) -> Result<()> {
        let url = self.table_url(resource)?;
        debug!("[JournalSync] Deleting {} row {}", resource.table_name(), id);

        let response = self
            .client
            .delete(url)
            .headers(self.headers(Some("return=minimal"))?)
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_body(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    const API_KEY: &str = "anon-key";

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
        headers: HashMap<String, String>,
        body: String,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            target,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            409 => "Conflict",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<(u16, String)>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);
                    let (status, body) = scripted_inner.lock().await.pop_front().unwrap_or((
                        500,
                        r#"{"message":"unexpected request"}"#.to_string(),
                    ));
                    let _ = write_http_response(&mut stream, status, &body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn list_sends_eq_filter_and_api_key() {
        let (base_url, captured, server) = start_mock_server(vec![(
            200,
            r#"[{"id":"u1","display_name":"alice"}]"#.to_string(),
        )])
        .await;
        let client = RemoteClient::new(&base_url, API_KEY).expect("client");

        let rows = client
            .list(Resource::Users, &ListFilter::eq("display_name", "alice"))
            .await
            .expect("list users");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "u1");

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert!(requests[0].target.starts_with("/rest/v1/users?"));
        assert!(requests[0].target.contains("display_name=eq.alice"));
        assert_eq!(
            requests[0].headers.get("apikey").map(String::as_str),
            Some(API_KEY)
        );
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer anon-key")
        );

        server.abort();
    }

    #[tokio::test]
    async fn insert_returns_stored_representation() {
        let (base_url, captured, server) = start_mock_server(vec![(
            201,
            r#"[{"id":"u-42","display_name":"bob","created_at":"2024-01-01T00:00:00Z"}]"#
                .to_string(),
        )])
        .await;
        let client = RemoteClient::new(&base_url, API_KEY).expect("client");

        let row = client
            .insert(
                Resource::Users,
                serde_json::json!({ "display_name": "bob" }),
            )
            .await
            .expect("insert user");

        assert_eq!(row["id"], "u-42");

        let requests = captured.lock().await;
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/rest/v1/users");
        assert_eq!(
            requests[0].headers.get("prefer").map(String::as_str),
            Some("return=representation")
        );
        assert!(requests[0].body.contains("\"display_name\":\"bob\""));

        server.abort();
    }

    #[tokio::test]
    async fn unique_violation_surfaces_as_conflict() {
        let (base_url, _captured, server) = start_mock_server(vec![(
            409,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint","details":null}"#
                .to_string(),
        )])
        .await;
        let client = RemoteClient::new(&base_url, API_KEY).expect("client");

        let err = client
            .insert(
                Resource::Users,
                serde_json::json!({ "display_name": "alice" }),
            )
            .await
            .expect_err("conflict");

        assert!(err.is_conflict());
        assert_eq!(err.status_code(), Some(409));
        assert!(!err.is_unreachable());

        server.abort();
    }

    #[tokio::test]
    async fn update_patches_by_id() {
        let (base_url, captured, server) = start_mock_server(vec![(204, String::new())]).await;
        let client = RemoteClient::new(&base_url, API_KEY).expect("client");

        client
            .update(
                Resource::Entries,
                "1700000000000",
                serde_json::json!({ "emotion": "calm" }),
            )
            .await
            .expect("update entry");

        let requests = captured.lock().await;
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(requests[0].target, "/rest/v1/diary_entries?id=eq.1700000000000");
        assert!(requests[0].body.contains("\"emotion\":\"calm\""));

        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);

        let client = RemoteClient::new(&format!("http://{}", addr), API_KEY).expect("client");
        let err = client
            .list(Resource::Users, &ListFilter::all())
            .await
            .expect_err("connection refused");

        assert!(err.is_unreachable());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(RemoteClient::new("not a url", API_KEY).is_err());
        assert!(RemoteClient::new("ftp://example.com", API_KEY).is_err());
        assert!(RemoteClient::new("https://example.com", "   ").is_err());
        assert!(RemoteClient::new("https://example.com/", API_KEY).is_ok());
    }
}
