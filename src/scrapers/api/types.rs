//! Raw provider payloads.
//!
//! These mirror the JSON the platform returns and are only ever handed to
//! the normalizer. Unknown fields are ignored; ids may arrive as numbers or
//! strings.

use serde::{Deserialize, Deserializer};

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub succeeded: Option<bool>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, alias = "info")]
    pub error: Option<String>,
    pub resp_data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct GroupData {
    pub group: RawGroup,
}

#[derive(Debug, Deserialize)]
pub struct TopicsData {
    #[serde(default)]
    pub topics: Vec<RawTopic>,
    /// Explicit end-of-list marker, when the provider sends one.
    #[serde(default)]
    pub has_more: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsData {
    #[serde(default)]
    pub comments: Vec<RawComment>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawGroup {
    #[serde(deserialize_with = "id_string")]
    pub group_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub statistics: Option<RawStatistics>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStatistics {
    #[serde(default)]
    pub members: Option<RawCount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCount {
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(default, deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImageUrl {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub original: Option<RawImageUrl>,
    #[serde(default)]
    pub large: Option<RawImageUrl>,
    #[serde(default)]
    pub thumbnail: Option<RawImageUrl>,
}

impl RawImage {
    /// Highest resolution URL available.
    pub fn best_url(&self) -> Option<&str> {
        [&self.original, &self.large, &self.thumbnail]
            .into_iter()
            .flatten()
            .map(|u| u.url.as_str())
            .find(|u| !u.is_empty())
    }
}

/// Body of a talk, question or answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTalk {
    #[serde(default)]
    pub owner: Option<RawUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTopic {
    #[serde(deserialize_with = "id_string")]
    pub topic_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub comments_count: Option<u64>,
    #[serde(default)]
    pub talk: Option<RawTalk>,
    #[serde(default)]
    pub question: Option<RawTalk>,
    #[serde(default)]
    pub answer: Option<RawTalk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawComment {
    #[serde(deserialize_with = "id_string")]
    pub comment_id: String,
    #[serde(default)]
    pub owner: Option<RawUser>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub create_time: Option<String>,
}

/// Accept an id sent either as a JSON number or a string.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Unsigned(u64),
        Signed(i64),
        Text(String),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Unsigned(n) => n.to_string(),
        Repr::Signed(n) => n.to_string(),
        Repr::Text(s) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_accept_numbers_and_strings() {
        let topic: RawTopic =
            serde_json::from_str(r#"{"topic_id": 48418518458481828, "type": "talk"}"#).unwrap();
        assert_eq!(topic.topic_id, "48418518458481828");

        let topic: RawTopic = serde_json::from_str(r#"{"topic_id": "abc"}"#).unwrap();
        assert_eq!(topic.topic_id, "abc");
    }

    #[test]
    fn test_best_image_url_prefers_original() {
        let image: RawImage = serde_json::from_str(
            r#"{"thumbnail": {"url": "t"}, "large": {"url": "l"}, "original": {"url": "o"}}"#,
        )
        .unwrap();
        assert_eq!(image.best_url(), Some("o"));

        let image: RawImage =
            serde_json::from_str(r#"{"thumbnail": {"url": "t"}, "original": {"url": ""}}"#)
                .unwrap();
        assert_eq!(image.best_url(), Some("t"));
    }

    #[test]
    fn test_failed_envelope_without_data() {
        let env: Envelope<GroupData> =
            serde_json::from_str(r#"{"succeeded": false, "code": 401, "error": "token expired"}"#)
                .unwrap();
        assert_eq!(env.succeeded, Some(false));
        assert_eq!(env.code, Some(401));
        assert!(env.resp_data.is_none());
    }
}
