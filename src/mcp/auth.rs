//! Bearer-token authentication: opt-out, not opt-in. No configured
//! allow-list means "development mode" — every request is accepted, but a
//! warning is logged once at construction so the gap is never silent.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    allowed_tokens: HashSet<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(allowed_tokens: Vec<String>) -> Self {
        if allowed_tokens.is_empty() {
            tracing::warn!("MCP server starting with no auth tokens configured; running in development mode");
        }
        Self { allowed_tokens: allowed_tokens.into_iter().collect() }
    }

    #[must_use]
    pub fn development() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn is_development_mode(&self) -> bool {
        self.allowed_tokens.is_empty()
    }

    /// In development mode every token (including none) authorizes.
    /// Otherwise the bearer token must appear in the allow-list verbatim.
    #[must_use]
    pub fn authorize(&self, bearer_token: Option<&str>) -> bool {
        if self.is_development_mode() {
            return true;
        }
        bearer_token.is_some_and(|t| self.allowed_tokens.contains(t))
    }
}

/// Parse an `Authorization` header value of the form `Bearer <token>`.
#[must_use]
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_mode_authorizes_everything() {
        let auth = AuthConfig::development();
        assert!(auth.is_development_mode());
        assert!(auth.authorize(None));
        assert!(auth.authorize(Some("anything")));
    }

    #[test]
    fn configured_allow_list_rejects_unknown_tokens() {
        let auth = AuthConfig::new(vec!["secret1".to_string()]);
        assert!(!auth.is_development_mode());
        assert!(auth.authorize(Some("secret1")));
        assert!(!auth.authorize(Some("secret2")));
        assert!(!auth.authorize(None));
    }

    #[test]
    fn parse_bearer_strips_the_scheme_prefix() {
        assert_eq!(parse_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer("Basic abc123"), None);
    }
}
