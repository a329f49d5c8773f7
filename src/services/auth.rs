//! Authorization gate for mutating endpoints.

use axum::http::{HeaderMap, header};

/// Decides whether a request may mutate the store.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, headers: &HeaderMap) -> bool;
}

/// Accepts `Authorization: Bearer <token>` matching a fixed admin token.
///
/// Without a configured token nothing is authorized.
#[derive(Clone, Debug, Default)]
pub struct TokenAuthorizer {
    token: Option<String>,
}

impl TokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

impl Authorizer for TokenAuthorizer {
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return false;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| constant_time_eq(presented.trim().as_bytes(), expected.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn matching_token_is_authorized() {
        let auth = TokenAuthorizer::new(Some("s3cret".into()));
        assert!(auth.is_authorized(&bearer("s3cret")));
        assert!(!auth.is_authorized(&bearer("s3cre")));
        assert!(!auth.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn unconfigured_token_denies_everything() {
        let auth = TokenAuthorizer::new(Some(String::new()));
        assert!(!auth.is_configured());
        assert!(!auth.is_authorized(&bearer("")));
    }
}
