//! Shared reqwest client for the REST side of a project.
//!
//! Reads go through [`with_retry`]; calls that change server state (sign in,
//! sign out) are sent once.

use super::error::HttpError;
use super::retry::{with_retry, RetryConfig, RetryError};
use reqwest::{header::HeaderMap, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    default_headers: HeaderMap,
    retry_config: RetryConfig,
}

pub struct HttpClientBuilder {
    timeout: Duration,
    retry_config: RetryConfig,
    headers: HeaderMap,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
            headers: HeaderMap::new(),
        }
    }
}

impl HttpClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Headers sent with every request, e.g. the project's `apikey`.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn build(self) -> Result<HttpClient, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .build()?;

        Ok(HttpClient {
            client,
            default_headers: self.headers,
            retry_config: self.retry_config,
        })
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Turn a non-success response into an [`HttpError`].
    pub async fn error_from_response(response: Response) -> HttpError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        HttpError::from_body(status, &body)
    }

    async fn send(request: RequestBuilder, bearer: Option<&str>) -> Result<Response, HttpError> {
        let request = match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn send_json<R>(request: RequestBuilder, bearer: Option<&str>) -> Result<R, HttpError>
    where
        R: for<'de> Deserialize<'de>,
    {
        Self::send(request, bearer)
            .await?
            .json::<R>()
            .await
            .map_err(|e| HttpError::ParseError(e.to_string()))
    }

    /// GET and deserialize JSON, retrying transient failures.
    pub async fn get_json<T>(&self, url: &str, bearer: Option<&str>) -> Result<T, RetryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        info!("GET request to {}", url);
        with_retry(
            move || async move { Self::send_json(self.client.get(url), bearer).await },
            &self.retry_config,
        )
        .await
    }

    /// GET and deserialize JSON with a single attempt, for checks that run
    /// on every prompt and must not stall it.
    pub async fn get_json_once<T>(&self, url: &str, bearer: Option<&str>) -> Result<T, HttpError>
    where
        T: for<'de> Deserialize<'de>,
    {
        info!("GET request to {} (single attempt)", url);
        Self::send_json(self.client.get(url), bearer).await
    }

    /// POST a JSON body and deserialize the JSON answer.
    pub async fn post_json<T, R>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &T,
    ) -> Result<R, HttpError>
    where
        T: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        info!("POST request to {}", url);
        Self::send_json(self.client.post(url).json(body), bearer).await
    }

    /// POST without a body; whatever comes back on success is dropped.
    pub async fn post_empty(&self, url: &str, bearer: Option<&str>) -> Result<(), HttpError> {
        info!("POST request to {}", url);
        Self::send(self.client.post(url), bearer).await?;
        Ok(())
    }

    /// The underlying reqwest client, for requests that need the raw
    /// response.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Headers added to every request on top of the per-request ones.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }
}
