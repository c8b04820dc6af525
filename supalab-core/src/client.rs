use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

use crate::auth::AuthClient;
use crate::functions::FunctionsClient;
use crate::http::{HttpClient, HttpError, RetryConfig};

pub const DEFAULT_URL: &str = "http://127.0.0.1:54321";

/// REST side of a Supabase project: auth and edge functions sharing one
/// HTTP client that carries the project's `apikey`.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    url: String,
    api_key: String,
    pub auth: AuthClient,
    pub functions: FunctionsClient,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid api key: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl SupabaseClient {
    pub fn new(url: &str, api_key: &str) -> Result<Self, ClientError> {
        Self::with_retry_config(url, api_key, RetryConfig::default())
    }

    pub fn with_retry_config(
        url: &str,
        api_key: &str,
        retry_config: RetryConfig,
    ) -> Result<Self, ClientError> {
        url::Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        headers.insert("apikey", key);

        let http = HttpClient::builder()
            .with_timeout(Duration::from_secs(10))
            .with_retry_config(retry_config)
            .with_default_headers(headers)
            .build()?;

        let url = url.trim_end_matches('/').to_string();
        Ok(Self {
            auth: AuthClient::new(http.clone(), &url),
            functions: FunctionsClient::new(http, &url),
            api_key: api_key.to_string(),
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_are_derived_from_url() {
        let client = SupabaseClient::new("http://127.0.0.1:54321/", "anon").unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:54321");
        assert_eq!(client.auth.base_url(), "http://127.0.0.1:54321/auth/v1");
        assert_eq!(
            client.functions.endpoint_url("hello"),
            "http://127.0.0.1:54321/functions/v1/hello"
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            SupabaseClient::new("not a url", "anon"),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            SupabaseClient::new(DEFAULT_URL, "bad\nkey"),
            Err(ClientError::InvalidApiKey(_))
        ));
    }
}
