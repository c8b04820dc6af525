//! Utilities for handling sensitive data

/// Patterns that identify headers whose values should not be echoed back
pub const SENSITIVE_HEADER_PATTERNS: [&str; 4] = ["authorization", "apikey", "cookie", "token"];

/// Config keys that are never shown in clear text
pub const HIDDEN_KEYS: [&str; 1] = ["password"];

/// Check if a header name carries credentials
pub fn is_sensitive_header(name: &str) -> bool {
    let lowercase_name = name.to_lowercase();
    SENSITIVE_HEADER_PATTERNS
        .iter()
        .any(|pattern| lowercase_name.contains(pattern))
}

/// Check if a config key must be hidden completely
pub fn is_hidden_key(key: &str) -> bool {
    HIDDEN_KEYS.contains(&key)
}

/// Replace every character with an asterisk, keeping only the length.
pub fn mask_all(value: &str) -> String {
    "*".repeat(value.chars().count())
}

/// Asterisks for a password in log output, never longer than eight.
pub fn mask_password(value: &str) -> String {
    "*".repeat(value.chars().count().min(8))
}

/// Mask sensitive data with asterisks while preserving some information
///
/// - For values < 12 chars: Last 2 chars visible, rest masked
/// - For values >= 12 chars: Last 4 chars visible, rest masked
/// - Dashes ('-') are preserved in their original positions
pub fn mask_sensitive_value(value: &str) -> String {
    let value_len = value.chars().count();
    let visible_suffix_len = if value_len >= 12 { 4 } else { 2.min(value_len) };
    let prefix_len = value_len.saturating_sub(visible_suffix_len);

    value
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < prefix_len && c != '-' {
                '*'
            } else {
                c
            }
        })
        .collect()
}

/// Mask a header value, keeping an auth scheme such as `Bearer` readable.
pub fn mask_header_value(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, credentials)) => {
            format!("{} {}", scheme, mask_sensitive_value(credentials))
        }
        None => mask_sensitive_value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sensitive_header() {
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("apikey"));
        assert!(is_sensitive_header("Set-Cookie"));
        assert!(is_sensitive_header("x-refresh-token"));
        assert!(!is_sensitive_header("content-type"));
        assert!(!is_sensitive_header("accept"));
    }

    #[test]
    fn test_mask_all_and_password() {
        assert_eq!(mask_all("hunter2"), "*******");
        assert_eq!(mask_all(""), "");
        assert_eq!(mask_password("correct horse battery"), "********");
        assert_eq!(mask_password("abc"), "***");
    }

    #[test]
    fn test_mask_sensitive_value() {
        assert_eq!(mask_sensitive_value("pass123"), "*****23");
        assert_eq!(mask_sensitive_value("ab"), "ab");
        assert_eq!(mask_sensitive_value(""), "");
        assert_eq!(mask_sensitive_value("password1234"), "********1234");
        assert_eq!(mask_sensitive_value("jwt-token-xyz"), "***-*****-xyz");
    }

    #[test]
    fn test_mask_header_value() {
        assert_eq!(
            mask_header_value("Bearer eyJhbGciOiJIUzI1NiJ9"),
            "Bearer ****************NiJ9"
        );
        assert_eq!(mask_header_value("anon-key"), "****-*ey");
    }
}
