use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use super::error::AuthError;
use super::types::{AuthSession, SignOutScope, User};
use crate::http::HttpClient;

/// GoTrue REST endpoints under `<url>/auth/v1`.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: HttpClient,
    base_url: String,
}

impl AuthClient {
    /// `http` must carry the `apikey` header.
    pub fn new(http: HttpClient, url: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/auth/v1", url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        debug!("Signing in {}", email);
        let url = format!("{}/token?grant_type=password", self.base_url);
        let body = json!({
            "email": email,
            "password": password.expose_secret(),
        });
        Ok(self.http.post_json(&url, None, &body).await?)
    }

    pub async fn get_user(&self, jwt: &SecretString) -> Result<User, AuthError> {
        let url = format!("{}/user", self.base_url);
        Ok(self
            .http
            .get_json(&url, Some(jwt.expose_secret()))
            .await?)
    }

    /// Same as [`get_user`](Self::get_user) without retries. A failed
    /// check is reported at once.
    pub async fn get_user_once(&self, jwt: &SecretString) -> Result<User, AuthError> {
        let url = format!("{}/user", self.base_url);
        Ok(self
            .http
            .get_json_once(&url, Some(jwt.expose_secret()))
            .await?)
    }

    pub async fn sign_out(&self, jwt: &SecretString, scope: SignOutScope) -> Result<(), AuthError> {
        debug!("Signing out, scope {}", scope);
        let url = format!("{}/logout?scope={}", self.base_url, scope);
        self.http
            .post_empty(&url, Some(jwt.expose_secret()))
            .await?;
        Ok(())
    }
}
