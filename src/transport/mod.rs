//! Transport to the financial operations API
//!
//! The dispatcher only sees the [`Transport`] trait. [`HttpTransport`] is the
//! reqwest-backed implementation used by the binaries.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::Credential;
use crate::routes::HttpMethod;
use crate::Result;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Fully resolved request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
    pub credential: Credential,
    pub binary_response: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl TransportResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HashMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one HTTP exchange. `Err` means the exchange itself failed
/// (connection, timeout); any HTTP status is an `Ok` response.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Pooled reqwest client bound to one API base URL.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let base_url = config.api_base_url.as_deref().ok_or_else(|| {
            GatewayError::Config("FINANCIAL_API_BASE_URL is not configured".to_string())
        })?;

        Self::new(base_url, config.request_timeout)
    }
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(to_reqwest(request.method), url);

        if !request.credential.is_empty() {
            builder = builder.header(AUTHORIZATION, request.credential.expose());
        }

        let pairs = flatten_query(&request.query);
        if !pairs.is_empty() {
            builder = builder.query(&pairs);
        }

        if !request.body.is_empty() {
            builder = builder.json(&request.body);
        }

        let response = builder.send().await.map_err(|e| {
            GatewayError::Transport(format!(
                "{} {} failed: {}",
                request.method, request.path, e
            ))
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| {
            GatewayError::Transport(format!("Failed to read response body for {}: {}", request.path, e))
        })?;

        debug!(
            method = %request.method,
            path = %request.path,
            status,
            bytes = bytes.len(),
            "Financial API responded"
        );

        let body = if request.binary_response && (200..300).contains(&status) {
            let content_type = headers.get(CONTENT_TYPE.as_str()).map(String::as_str);
            encode_binary(&bytes, content_type)
        } else {
            decode_body(&bytes)
        };

        Ok(TransportResponse {
            status,
            body,
            headers,
        })
    }
}

/// Nested maps become `a[b]=v`, arrays `a[]=v`; nulls are dropped.
pub fn flatten_query(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in query {
        flatten_into(name, value, &mut pairs);
    }
    pairs
}

fn flatten_into(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::String(s) => pairs.push((prefix.to_string(), s.clone())),
        Value::Array(items) => {
            let key = format!("{}[]", prefix);
            for item in items {
                flatten_into(&key, item, pairs);
            }
        }
        Value::Object(map) => {
            for (name, nested) in map {
                flatten_into(&format!("{}[{}]", prefix, name), nested, pairs);
            }
        }
        other => pairs.push((prefix.to_string(), other.to_string())),
    }
}

/// JSON when it parses, text otherwise, null when empty.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }

    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn encode_binary(bytes: &[u8], content_type: Option<&str>) -> Value {
    json!({
        "encoding": "base64",
        "content_type": content_type.unwrap_or("application/octet-stream"),
        "size": bytes.len(),
        "content": base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}
