//! Inline entity cleanup for provider text.
//!
//! Post and comment bodies embed self-closing `<e .../>` tags for hashtags,
//! mentions, links and emphasis, with URL-encoded `title` attributes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static ENTITY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<e\s+([^>]*?)\s*/?>").unwrap());

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_]+)\s*=\s*"([^"]*)""#).unwrap());

fn decode(value: &str) -> Cow<'_, str> {
    urlencoding::decode(value).unwrap_or(Cow::Borrowed(value))
}

fn attributes(raw: &str) -> HashMap<&str, &str> {
    ATTRIBUTE
        .captures_iter(raw)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}

fn render_entity(caps: &Captures) -> String {
    let attrs = attributes(&caps[1]);
    let title = attrs.get("title").map(|t| decode(t)).unwrap_or_default();

    match attrs.get("type").copied() {
        Some("web") => {
            let href = attrs.get("href").map(|h| decode(h)).unwrap_or_default();
            if title.is_empty() {
                href.into_owned()
            } else if href.is_empty() || title == href {
                title.into_owned()
            } else {
                format!("{} ({})", title, href)
            }
        }
        _ => title.into_owned(),
    }
}

/// Replace inline entities with readable text and trim the result.
pub fn clean_text(text: &str) -> String {
    ENTITY_TAG
        .replace_all(text, |caps: &Captures| render_entity(caps))
        .trim()
        .to_string()
}
