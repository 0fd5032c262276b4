//! Canonical post, comment and image records.
//!
//! Every retrieval path (structured API or rendered HTML) produces these
//! types; nothing downstream of the normalizer sees provider payloads.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Records that carry a stable identity within one crawl.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Author of a post or comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An image referenced by a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub remote_url: String,
    /// Set once the media fetcher has stored the image locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl ImageRef {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            remote_url: url.into(),
            local_path: None,
        }
    }
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: Author,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<FixedOffset>>,
}

/// A single published item within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: Author,
    /// Empty when the post has no title.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Images in the order they appear in the post.
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Missing when the render path could not find a timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<FixedOffset>>,
    /// Present only when comments were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<u64>,
}

impl Post {
    /// Create a post with only an id and content; other fields default.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: Author::default(),
            title: String::new(),
            content: content.into(),
            images: Vec::new(),
            create_time: None,
            comments: None,
            likes: None,
            comments_count: None,
        }
    }

    /// Title for display, falling back to a placeholder.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }

    /// Content cut to at most `max_chars` characters, with an ellipsis when cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }

    /// Whether the provider says there are comments to fetch.
    pub fn has_comments(&self) -> bool {
        self.comments_count.map_or(true, |n| n > 0)
    }
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_counts_characters_not_bytes() {
        let post = Post::new("1", "知识星球".repeat(30));
        let excerpt = post.excerpt(100);
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.chars().count(), 103);

        let short = Post::new("2", "short");
        assert_eq!(short.excerpt(100), "short");
    }

    #[test]
    fn test_display_title_placeholder() {
        let mut post = Post::new("1", "body");
        assert_eq!(post.display_title(), "(untitled)");
        post.title = "Weekly notes".to_string();
        assert_eq!(post.display_title(), "Weekly notes");
    }


    #[test]
    fn test_optional_fields_skipped_when_absent() {
        let json = serde_json::to_value(Post::new("1", "body")).unwrap();
        assert!(json.get("comments").is_none());
        assert!(json.get("likes").is_none());
        assert_eq!(json["title"], "");
    }
}
