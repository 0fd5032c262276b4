//! Mapping from raw provider payloads to canonical records.

mod rich_text;

pub use rich_text::clean_text;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::models::{Author, Comment, Group, ImageRef, Post};
use crate::scrapers::api::{RawComment, RawGroup, RawTalk, RawTopic, RawUser};

/// Timestamp layouts seen from the provider, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"];

/// Parse a provider timestamp such as `2024-03-05T10:20:30.123+0800`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
        .or_else(|| {
            debug!("Unrecognized timestamp: {}", raw);
            None
        })
}

fn author(user: Option<&RawUser>) -> Author {
    user.map(|u| Author {
        id: u.user_id.clone(),
        name: u.name.clone(),
    })
    .unwrap_or_default()
}

fn images(talk: &RawTalk) -> impl Iterator<Item = ImageRef> + '_ {
    talk.images
        .iter()
        .filter_map(|i| i.best_url())
        .map(ImageRef::remote)
}

/// Convert a group payload.
pub fn group(raw: RawGroup) -> Group {
    let member_count = raw
        .member_count
        .or_else(|| raw.statistics.and_then(|s| s.members).map(|m| m.count))
        .unwrap_or(0);

    Group {
        id: raw.group_id,
        name: raw.name,
        description: raw.description.unwrap_or_default(),
        member_count,
    }
}

/// Convert a topic payload into a post.
///
/// Talks use the talk body. Questions use the question body, followed by
/// the answer text and images.
pub fn topic(raw: &RawTopic) -> Post {
    let primary = raw
        .talk
        .as_ref()
        .or(raw.question.as_ref())
        .or(raw.answer.as_ref());

    let mut post = Post::new(raw.topic_id.clone(), String::new());
    post.title = raw.title.as_deref().map(clean_text).unwrap_or_default();
    post.create_time = raw.create_time.as_deref().and_then(parse_timestamp);
    post.likes = raw.likes_count;
    post.comments_count = raw.comments_count;

    if let Some(body) = primary {
        post.author = author(body.owner.as_ref());
        post.content = body.text.as_deref().map(clean_text).unwrap_or_default();
        post.images.extend(images(body));
    }

    if raw.talk.is_none() && raw.question.is_some() {
        if let Some(answer) = &raw.answer {
            let answer_text = answer.text.as_deref().map(clean_text).unwrap_or_default();
            if !answer_text.is_empty() {
                if !post.content.is_empty() {
                    post.content.push_str("\n\n");
                }
                post.content.push_str(&answer_text);
            }
            post.images.extend(images(answer));
        }
    }

    post
}

/// Convert a comment payload.
pub fn comment(raw: &RawComment) -> Comment {
    Comment {
        id: raw.comment_id.clone(),
        author: author(raw.owner.as_ref()),
        text: clean_text(&raw.text),
        create_time: raw.create_time.as_deref().and_then(parse_timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn raw_topic(json: &str) -> RawTopic {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let t = parse_timestamp("2024-03-05T10:20:30.123+0800").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2024, 3, 5));
        assert_eq!(t.hour(), 10);
        assert_eq!(t.offset().local_minus_utc(), 8 * 3600);

        assert!(parse_timestamp("2024-03-05T10:20:30+0800").is_some());
        assert!(parse_timestamp("2024-03-05T10:20:30+08:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_talk_topic() {
        let post = topic(&raw_topic(
            r#"{
                "topic_id": 111,
                "type": "talk",
                "title": "Weekly",
                "create_time": "2024-03-05T10:20:30.123+0800",
                "likes_count": 7,
                "comments_count": 2,
                "talk": {
                    "owner": {"user_id": 42, "name": "张三"},
                    "text": "hello <e type=\"hashtag\" title=\"%23rust%23\" />",
                    "images": [
                        {"large": {"url": "https://img/1-large"}, "original": {"url": "https://img/1"}},
                        {"thumbnail": {"url": "https://img/2-thumb"}}
                    ]
                }
            }"#,
        ));

        assert_eq!(post.id, "111");
        assert_eq!(post.title, "Weekly");
        assert_eq!(post.author.id, "42");
        assert_eq!(post.author.name, "张三");
        assert_eq!(post.content, "hello #rust#");
        assert_eq!(post.likes, Some(7));
        assert_eq!(post.comments_count, Some(2));
        assert!(post.create_time.is_some());
        let urls: Vec<_> = post.images.iter().map(|i| i.remote_url.as_str()).collect();
        assert_eq!(urls, vec!["https://img/1", "https://img/2-thumb"]);
        assert!(post.images.iter().all(|i| i.local_path.is_none()));
        assert!(post.comments.is_none());
    }

    #[test]
    fn test_question_topic_appends_answer() {
        let post = topic(&raw_topic(
            r#"{
                "topic_id": "q1",
                "type": "q&a",
                "question": {"owner": {"user_id": 1, "name": "asker"}, "text": "Why?",
                             "images": [{"original": {"url": "q.png"}}]},
                "answer": {"owner": {"user_id": 2, "name": "owner"}, "text": "Because.",
                           "images": [{"original": {"url": "a.png"}}]}
            }"#,
        ));

        assert_eq!(post.author.name, "asker");
        assert_eq!(post.content, "Why?\n\nBecause.");
        assert_eq!(post.title, "");
        let urls: Vec<_> = post.images.iter().map(|i| i.remote_url.as_str()).collect();
        assert_eq!(urls, vec!["q.png", "a.png"]);
    }

    #[test]
    fn test_topic_without_body_defaults() {
        let post = topic(&raw_topic(r#"{"topic_id": 5, "type": "task"}"#));
        assert_eq!(post.id, "5");
        assert_eq!(post.content, "");
        assert_eq!(post.author, Author::default());
    }

    #[test]
    fn test_group_member_count_fallback() {
        let raw: RawGroup = serde_json::from_str(
            r#"{"group_id": 28888412851511, "name": "星球", "statistics": {"members": {"count": 321}}}"#,
        )
        .unwrap();
        let g = group(raw);
        assert_eq!(g.id, "28888412851511");
        assert_eq!(g.member_count, 321);
        assert_eq!(g.description, "");
    }

    #[test]
    fn test_comment() {
        let raw: RawComment = serde_json::from_str(
            r#"{"comment_id": 9, "owner": {"user_id": "u", "name": "bob"}, "text": " nice ",
                "create_time": "2024-03-05T11:00:00.000+0800"}"#,
        )
        .unwrap();
        let c = comment(&raw);
        assert_eq!(c.id, "9");
        assert_eq!(c.author.name, "bob");
        assert_eq!(c.text, "nice");
        assert!(c.create_time.is_some());
    }
}
