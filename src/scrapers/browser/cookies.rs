//! Session cookie injection for browser pages.

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
#[cfg(feature = "browser")]
use chromiumoxide::Page;
#[cfg(feature = "browser")]
use tracing::{debug, warn};

#[cfg(feature = "browser")]
use crate::models::CredentialContext;

/// Cookie domain covering every subdomain of the site,
/// e.g. `https://wx.zsxq.com` gives `.zsxq.com`.
pub fn cookie_domain(web_base_url: &str) -> String {
    let host = url::Url::parse(web_base_url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| web_base_url.to_string());

    if host.parse::<std::net::IpAddr>().is_ok() || host == "localhost" {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        format!(".{}", labels[labels.len() - 2..].join("."))
    } else {
        format!(".{}", host)
    }
}

/// Set every cookie from the credential context on `page`.
///
/// Returns the number of cookies set. Individual failures are logged and
/// skipped.
#[cfg(feature = "browser")]
pub(crate) async fn inject_cookies(
    page: &Page,
    credentials: &CredentialContext,
    domain: &str,
) -> usize {
    let mut injected = 0;

    for (name, value) in credentials.cookie_pairs() {
        let cookie_param = CookieParam::builder()
            .name(name.clone())
            .value(value)
            .domain(domain)
            .path("/")
            .build();

        match cookie_param {
            Ok(param) => {
                if let Err(e) = page.set_cookie(param).await {
                    warn!("Failed to set cookie {}: {}", name, e);
                } else {
                    injected += 1;
                }
            }
            Err(e) => {
                warn!("Failed to build cookie {}: {}", name, e);
            }
        }
    }

    debug!("Injected {} cookies for {}", injected, domain);
    injected
}
