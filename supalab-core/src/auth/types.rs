use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session returned by the password grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub refresh_token: String,
    pub user: User,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub last_sign_in_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub app_metadata: Value,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthSession {
    /// The whole session as JSON, unknown server fields included.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutScope {
    Global,
    #[default]
    Local,
    Others,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Global => "global",
            SignOutScope::Local => "local",
            SignOutScope::Others => "others",
        }
    }
}

impl std::fmt::Display for SignOutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_keeps_unknown_fields() {
        let session: AuthSession = serde_json::from_value(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1700000000,
            "refresh_token": "r",
            "weak_password": null,
            "user": {
                "id": "u1",
                "email": "a@b.c",
                "last_sign_in_at": "2025-01-02T03:04:05Z",
                "identities": [{"provider": "email"}]
            }
        }))
        .unwrap();

        assert_eq!(session.user.email.as_deref(), Some("a@b.c"));
        assert!(session.extra.contains_key("weak_password"));

        let value = session.to_value();
        assert_eq!(value["user"]["identities"][0]["provider"], "email");
        assert_eq!(value["expires_at"], 1700000000);
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(SignOutScope::default().to_string(), "local");
        assert_eq!(SignOutScope::Global.as_str(), "global");
        assert_eq!(SignOutScope::Others.as_str(), "others");
    }
}
