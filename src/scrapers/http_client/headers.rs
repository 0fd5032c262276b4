//! Request header rotation.

use std::collections::BTreeMap;

use super::user_agent::random_user_agent;
use crate::models::CredentialContext;

/// Builds the header set for each outbound call.
///
/// Fixed browser-like fields are combined with a user agent drawn from the
/// pool. Headers pinned on the credential context take precedence, and the
/// cookie is always taken from the context.
#[derive(Debug, Clone)]
pub struct HeaderRotator {
    origin: String,
    referer: String,
    user_agent: Option<String>,
}

impl HeaderRotator {
    /// `web_base_url` is the site the API is normally called from,
    /// e.g. `https://wx.zsxq.com`.
    pub fn new(web_base_url: &str) -> Self {
        let origin = web_base_url.trim_end_matches('/').to_string();
        Self {
            referer: format!("{}/dweb2/", origin),
            origin,
            user_agent: None,
        }
    }

    /// Always use this user agent instead of rotating.
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Produce a header set for one call.
    pub fn next_headers(&self, base: &CredentialContext) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());

        headers.insert("User-Agent".to_string(), user_agent);
        headers.insert(
            "Content-Type".to_string(),
            "application/json;charset=utf8".to_string(),
        );
        headers.insert(
            "Accept".to_string(),
            "application/json, text/plain, */*".to_string(),
        );
        headers.insert(
            "Accept-Language".to_string(),
            "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        );
        headers.insert("Referer".to_string(), self.referer.clone());
        headers.insert("Origin".to_string(), self.origin.clone());
        headers.insert("Sec-Fetch-Dest".to_string(), "empty".to_string());
        headers.insert("Sec-Fetch-Mode".to_string(), "cors".to_string());
        headers.insert("Sec-Fetch-Site".to_string(), "same-site".to_string());
        headers.insert("Pragma".to_string(), "no-cache".to_string());
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());

        for (name, value) in &base.headers {
            headers.insert(name.clone(), value.clone());
        }

        headers.insert("Cookie".to_string(), base.cookie_header());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::http_client::user_agent::BROWSER_USER_AGENTS;

    #[test]
    fn test_required_fields_present() {
        let ctx = CredentialContext::from_token("TOKEN").unwrap();
        let headers = HeaderRotator::new("https://wx.zsxq.com/").next_headers(&ctx);

        assert_eq!(headers["Origin"], "https://wx.zsxq.com");
        assert_eq!(headers["Referer"], "https://wx.zsxq.com/dweb2/");
        assert_eq!(headers["Accept"], "application/json, text/plain, */*");
        assert_eq!(headers["Sec-Fetch-Mode"], "cors");
        assert_eq!(headers["Cookie"], "zsxq_access_token=TOKEN");
        assert!(BROWSER_USER_AGENTS.contains(&headers["User-Agent"].as_str()));
    }

    #[test]
    fn test_pinned_headers_override_rotation() {
        let mut ctx = CredentialContext::from_cookie("a=b").unwrap();
        ctx.headers
            .insert("User-Agent".to_string(), "Pinned/1.0".to_string());
        let rotator = HeaderRotator::new("https://wx.zsxq.com");

        for _ in 0..5 {
            assert_eq!(rotator.next_headers(&ctx)["User-Agent"], "Pinned/1.0");
        }
    }

    #[test]
    fn test_cookie_cannot_be_pinned_away() {
        let mut ctx = CredentialContext::from_cookie("real=1").unwrap();
        ctx.headers.insert("Cookie".to_string(), "stale=0".to_string());
        let headers = HeaderRotator::new("https://wx.zsxq.com").next_headers(&ctx);
        assert_eq!(headers["Cookie"], "real=1");
    }

    #[test]
    fn test_fixed_user_agent() {
        let ctx = CredentialContext::from_cookie("a=b").unwrap();
        let rotator =
            HeaderRotator::new("https://wx.zsxq.com").with_user_agent(Some("Custom/2".into()));
        assert_eq!(rotator.next_headers(&ctx)["User-Agent"], "Custom/2");
    }
}
