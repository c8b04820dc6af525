//! Edge function invocation.
//!
//! Unlike the auth calls, an edge function call keeps everything about the
//! exchange in an [`EdgeResponse`] so the lab can show the raw request and
//! response when asked to.

use regex::Regex;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::http::{HttpClient, HttpError};
use crate::utils::sensitive_data::{is_sensitive_header, mask_header_value};

pub const EDGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FunctionsClient {
    http: HttpClient,
    base_url: String,
}

fn literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").expect("valid literal regex"))
}

/// Interpret a payload typed at the prompt: JSON first, then a
/// single-quoted literal such as `{'name': 'x', 'ok': True}`. Anything else
/// is an empty object.
pub fn parse_payload(text: &str) -> Value {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return value;
    }
    let swapped = text.replace('\'', "\"");
    let swapped = literal_regex().replace_all(&swapped, |caps: &regex::Captures| {
        match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        }
    });
    serde_json::from_str(&swapped).unwrap_or_else(|_| json!({}))
}

/// What was sent.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// What came back, plus the request that produced it.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub url: String,
    pub status: u16,
    pub ok: bool,
    pub elapsed: Duration,
    pub content_type: String,
    pub cookies: Vec<(String, String)>,
    pub request: RequestSummary,
    pub text: String,
    pub json: Option<Value>,
}

impl EdgeResponse {
    pub fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }

    /// Full report of the exchange, one line per entry. Authorization
    /// values are masked.
    pub fn report(&self) -> Vec<String> {
        let cookies = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        let mut lines = vec![
            format!("Response URL: {}", self.url),
            format!("Status Code: {}", self.status),
            format!("Response OK: {}", self.ok),
            format!(
                "Elapsed Time: {:.6} seconds ({:?})",
                self.elapsed.as_secs_f64(),
                self.elapsed
            ),
            format!("Content-Type: {}", self.content_type),
            format!("Cookies: {{{cookies}}}"),
            format!("Request Method: {}", self.request.method),
            format!("Request URL: {}", self.request.url),
            "Request Headers:".to_string(),
        ];
        for (name, value) in &self.request.headers {
            let shown = if is_sensitive_header(name) {
                mask_header_value(value)
            } else {
                value.clone()
            };
            lines.push(format!("   {name}: {shown}"));
        }
        lines.push(format!("Request Body: {}", self.request.body));
        lines.push(format!(
            "Response JSON: {}",
            self.json
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "None".to_string())
        ));
        lines.push(format!("Response Text: {}", self.text));
        lines
    }
}

fn header_pairs(defaults: &HeaderMap, request: &HeaderMap) -> Vec<(String, String)> {
    let mut merged = defaults.clone();
    for (name, value) in request {
        merged.insert(name.clone(), value.clone());
    }
    merged
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// `name=value` of every `set-cookie` header, attributes dropped.
fn cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl FunctionsClient {
    pub fn new(http: HttpClient, url: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/functions/v1", url.trim_end_matches('/')),
        }
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// POST `payload` to the function. Any HTTP status is a response;
    /// only transport failures are errors.
    pub async fn invoke(
        &self,
        endpoint: &str,
        payload: &Value,
        bearer: &SecretString,
    ) -> Result<EdgeResponse, HttpError> {
        let url = self.endpoint_url(endpoint);
        let body = payload.to_string();
        debug!("Invoking edge function {}", url);

        let request = self
            .http
            .inner()
            .post(&url)
            .timeout(EDGE_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {}", bearer.expose_secret()))
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone())
            .build()?;

        let summary = RequestSummary {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: header_pairs(self.http.default_headers(), request.headers()),
            body,
        };

        let started = Instant::now();
        let response = self.http.inner().execute(request).await?;
        let elapsed = started.elapsed();

        let status = response.status();
        let response_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let cookies = cookies(response.headers());
        let text = response.text().await?;
        let json = serde_json::from_str(&text).ok();

        Ok(EdgeResponse {
            url: response_url,
            status: status.as_u16(),
            ok: status.is_success(),
            elapsed,
            content_type,
            cookies,
            request: summary,
            text,
            json,
        })
    }
}
