//! Post extraction from rendered HTML.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CrawlError, Result};
use crate::models::{Author, ImageRef, Post};
use crate::normalize::{clean_text, parse_timestamp};

/// CSS selectors used to pull posts out of the web view.
///
/// The platform's markup changes over time, so every selector can be
/// overridden from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSelectors {
    /// One node per post.
    pub container: String,
    pub author: String,
    pub title: String,
    pub content: String,
    pub image: String,
    pub date: String,
    pub likes: String,
    pub comments: String,
    /// Attribute on the container holding the topic id.
    pub id_attribute: String,
}

impl Default for RenderSelectors {
    fn default() -> Self {
        Self {
            container: ".topic-container".to_string(),
            author: ".author .name, .role".to_string(),
            title: ".title".to_string(),
            content: ".content, .talk-content-container".to_string(),
            image: ".image-container img, img.image".to_string(),
            date: ".date".to_string(),
            likes: ".like-count".to_string(),
            comments: ".comment-count".to_string(),
            id_attribute: "data-topic-id".to_string(),
        }
    }
}

/// Compiled form of [`RenderSelectors`].
struct Compiled {
    container: Selector,
    author: Selector,
    title: Selector,
    content: Selector,
    image: Selector,
    date: Selector,
    likes: Selector,
    comments: Selector,
}

fn compile(name: &str, css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| CrawlError::Config(format!("invalid {} selector '{}': {}", name, css, e)))
}

impl RenderSelectors {
    fn compile(&self) -> Result<Compiled> {
        Ok(Compiled {
            container: compile("container", &self.container)?,
            author: compile("author", &self.author)?,
            title: compile("title", &self.title)?,
            content: compile("content", &self.content)?,
            image: compile("image", &self.image)?,
            date: compile("date", &self.date)?,
            likes: compile("likes", &self.likes)?,
            comments: compile("comments", &self.comments)?,
        })
    }
}

/// Whitespace-collapsed text of the first match.
fn first_text(node: ElementRef<'_>, selector: &Selector) -> String {
    node.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Leading integer in a counter such as "12 likes".
fn first_count(node: ElementRef<'_>, selector: &Selector) -> Option<u64> {
    let text = first_text(node, selector);
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Extract posts in document order.
///
/// Containers with missing fields still produce a post, with empty strings
/// for whatever could not be found. Only a page with no containers at all
/// is an error.
pub fn parse_posts(html: &str, selectors: &RenderSelectors) -> Result<Vec<Post>> {
    let compiled = selectors.compile()?;
    let document = Html::parse_document(html);

    let posts: Vec<Post> = document
        .select(&compiled.container)
        .enumerate()
        .map(|(index, node)| {
            let id = node
                .value()
                .attr(&selectors.id_attribute)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("web-{}", index));

            let mut post = Post::new(id, clean_text(&first_text(node, &compiled.content)));
            post.author = Author {
                id: String::new(),
                name: first_text(node, &compiled.author),
            };
            post.title = first_text(node, &compiled.title);
            post.images = node
                .select(&compiled.image)
                .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
                .filter(|src| !src.is_empty())
                .map(ImageRef::remote)
                .collect();
            post.create_time = parse_timestamp(&first_text(node, &compiled.date));
            post.likes = first_count(node, &compiled.likes);
            post.comments_count = first_count(node, &compiled.comments);
            post
        })
        .collect();

    if posts.is_empty() {
        return Err(CrawlError::Parse(format!(
            "no post containers matched '{}'",
            selectors.container
        )));
    }

    debug!("Parsed {} posts from rendered page", posts.len());
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_missing_title_keeps_content() {
        let html = r#"
            <html><body>
              <div class="topic-container">
                <div class="author"><span class="name">李四</span></div>
                <div class="content">  今天分享一个
                    Rust 技巧 </div>
              </div>
            </body></html>
        "#;

        let posts = parse_posts(html, &RenderSelectors::default()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "");
        assert_eq!(posts[0].content, "今天分享一个 Rust 技巧");
        assert_eq!(posts[0].author.name, "李四");
        assert_eq!(posts[0].id, "web-0");
        assert!(posts[0].create_time.is_none());
    }

    #[test]
    fn test_no_containers_is_parse_error() {
        let html = "<html><body><div class='login'>请登录</div></body></html>";
        let err = parse_posts(html, &RenderSelectors::default()).unwrap_err();
        assert!(matches!(err, CrawlError::Parse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_full_container_in_document_order() {
        let html = r#"
            <div class="topic-container" data-topic-id="8855">
              <div class="role">owner</div>
              <div class="title">First</div>
              <div class="talk-content-container">body text</div>
              <div class="image-container"><img src="https://img/a.jpg"><img data-src="https://img/b.png"></div>
              <div class="date">2024-03-05T10:20:30.000+0800</div>
              <div class="like-count">12</div>
              <div class="comment-count">3 comments</div>
            </div>
            <div class="topic-container"><div class="content">second</div></div>
        "#;

        let posts = parse_posts(html, &RenderSelectors::default()).unwrap();
        assert_eq!(posts.len(), 2);

        let first = &posts[0];
        assert_eq!(first.id, "8855");
        assert_eq!(first.author.name, "owner");
        assert_eq!(first.title, "First");
        assert_eq!(first.content, "body text");
        let urls: Vec<_> = first.images.iter().map(|i| i.remote_url.as_str()).collect();
        assert_eq!(urls, vec!["https://img/a.jpg", "https://img/b.png"]);
        assert!(first.create_time.is_some());
        assert_eq!(first.likes, Some(12));
        assert_eq!(first.comments_count, Some(3));

        assert_eq!(posts[1].id, "web-1");
        assert_eq!(posts[1].content, "second");
        assert_eq!(posts[1].author.name, "");
    }

    #[test]
    fn test_custom_selectors() {
        let selectors = RenderSelectors {
            container: "article".to_string(),
            content: "p".to_string(),
            ..Default::default()
        };
        let posts = parse_posts("<article><p>x</p></article>", &selectors).unwrap();
        assert_eq!(posts[0].content, "x");
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let selectors = RenderSelectors {
            container: "[[".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            parse_posts("<p></p>", &selectors),
            Err(CrawlError::Config(_))
        ));
    }
}
