//! Upstream account configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

/// How the account credential is attached to outbound requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <credential>`
    #[default]
    Bearer,
    /// `x-api-key: <credential>`
    XApiKey,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Bearer => write!(f, "bearer"),
            Self::XApiKey => write!(f, "x-api-key"),
        }
    }
}

/// One upstream credential/endpoint pair.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct AccountConfig {
    /// Unique, stable identifier
    #[validate(length(min = 1_u64, max = 128_u64))]
    pub id: String,
    /// Opaque secret (API key or OAuth access token)
    #[validate(length(min = 1_u64), custom(function = "validate_credential"))]
    pub credential: String,
    /// Base endpoint, e.g. `https://api.anthropic.com`
    #[validate(url)]
    pub base_url: String,
    /// Header used to carry the credential
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    /// Disabled accounts are skipped at load time
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AccountConfig {
    /// Create an enabled bearer-token account.
    pub fn new(id: impl Into<String>, credential: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential: credential.into(),
            base_url: base_url.into(),
            auth_scheme: AuthScheme::default(),
            enabled: true,
        }
    }

    /// Builder-style auth scheme override.
    #[must_use]
    pub fn with_auth_scheme(mut self, auth_scheme: AuthScheme) -> Self {
        self.auth_scheme = auth_scheme;
        self
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("credential", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("auth_scheme", &self.auth_scheme)
            .field("enabled", &self.enabled)
            .finish()
    }
}

const fn default_true() -> bool {
    true
}

/// The credential ends up in a header value, so only visible ASCII is allowed.
fn validate_credential(credential: &str) -> Result<(), ValidationError> {
    if credential.bytes().all(|b| b.is_ascii_graphic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("credential_charset");
        err.message = Some("credential must be printable ASCII without spaces".into());
        Err(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credential() {
        let account = AccountConfig::new("a", "sk-secret-value", "https://api.example.com");
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_auth_scheme_serde() {
        let json = r#"{"id":"a","credential":"k","base_url":"https://x.test","auth_scheme":"x-api-key"}"#;
        let account: AccountConfig = serde_json::from_str(json).unwrap();
        assert_eq!(account.auth_scheme, AuthScheme::XApiKey);
        assert!(account.enabled);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let account = AccountConfig::new("a", "k", "not a url");
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_credential_with_newline_rejected() {
        let account = AccountConfig::new("a", "sk-abc\nInjected: 1", "https://x.test");
        assert!(account.validate().is_err());
        assert!(AccountConfig::new("a", "sk-abc", "https://x.test").validate().is_ok());
    }
}
