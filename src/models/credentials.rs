//! Session credentials and the header set reused across calls.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CrawlError, Result};

/// Cookie name the platform uses for its access token.
pub const ACCESS_TOKEN_COOKIE: &str = "zsxq_access_token";

/// Credential context for one crawl invocation.
///
/// Built once and passed by reference into every retrieval call. Only the
/// `headers` map changes after construction, when a caller pins a rotated
/// header set for reuse.
#[derive(Clone)]
pub struct CredentialContext {
    cookie: Option<String>,
    token: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl CredentialContext {
    /// Build a context; at least one of `cookie` or `token` must be non-empty.
    pub fn new(cookie: Option<String>, token: Option<String>) -> Result<Self> {
        let cookie = cookie
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if cookie.is_none() && token.is_none() {
            return Err(CrawlError::InvalidCredentials);
        }

        Ok(Self {
            cookie,
            token,
            headers: BTreeMap::new(),
        })
    }

    pub fn from_cookie(cookie: impl Into<String>) -> Result<Self> {
        Self::new(Some(cookie.into()), None)
    }

    pub fn from_token(token: impl Into<String>) -> Result<Self> {
        Self::new(None, Some(token.into()))
    }

    /// Value for the `Cookie` header.
    ///
    /// The token is appended as the access-token cookie unless the cookie
    /// string already carries one.
    pub fn cookie_header(&self) -> String {
        let token_pair = self
            .token
            .as_ref()
            .map(|t| format!("{}={}", ACCESS_TOKEN_COOKIE, t));

        match (&self.cookie, token_pair) {
            (Some(cookie), Some(pair)) if !cookie.contains(ACCESS_TOKEN_COOKIE) => {
                format!("{}; {}", cookie.trim_end_matches(';'), pair)
            }
            (Some(cookie), _) => cookie.clone(),
            (None, Some(pair)) => pair,
            (None, None) => String::new(),
        }
    }

    /// Split the cookie header into name/value pairs.
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        self.cookie_header()
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.trim().to_string()))
                }
            })
            .collect()
    }
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_cookie_or_token() {
        assert!(matches!(
            CredentialContext::new(None, None),
            Err(CrawlError::InvalidCredentials)
        ));
        assert!(matches!(
            CredentialContext::new(Some("  ".into()), Some(String::new())),
            Err(CrawlError::InvalidCredentials)
        ));
        assert!(CredentialContext::from_token("abc").is_ok());
    }

    #[test]
    fn test_cookie_header_from_token_only() {
        let ctx = CredentialContext::from_token("ABC-123").unwrap();
        assert_eq!(ctx.cookie_header(), "zsxq_access_token=ABC-123");
    }

    #[test]
    fn test_cookie_header_merges_token_once() {
        let ctx = CredentialContext::new(Some("abtest_env=product;".into()), Some("T".into()))
            .unwrap();
        assert_eq!(ctx.cookie_header(), "abtest_env=product; zsxq_access_token=T");

        let ctx = CredentialContext::new(
            Some("zsxq_access_token=FROM_COOKIE; a=b".into()),
            Some("T".into()),
        )
        .unwrap();
        assert_eq!(ctx.cookie_header(), "zsxq_access_token=FROM_COOKIE; a=b");
    }

    #[test]
    fn test_cookie_pairs() {
        let ctx = CredentialContext::from_cookie("a=1; b = 2 ;broken; zsxq_access_token=X").unwrap();
        let pairs = ctx.cookie_pairs();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("zsxq_access_token".to_string(), "X".to_string()),
            ]
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let ctx = CredentialContext::from_cookie("zsxq_access_token=SECRET").unwrap();
        let debug = format!("{:?}", ctx);
        assert!(!debug.contains("SECRET"));
    }
}
