//! Structured JSON API retrieval.
//!
//! Group info, topic lists and comment lists are fetched from the
//! platform's JSON endpoints. Lists are paged with an `end_time` cursor:
//! the `create_time` of the last item on the previous page.

mod types;

pub use types::{
    CommentsData, Envelope, GroupData, RawComment, RawGroup, RawImage, RawTalk, RawTopic,
    RawUser, TopicsData,
};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::HttpClient;
use crate::error::{CrawlError, Result};
use crate::models::Group;
use crate::normalize;

/// Default API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.zsxq.com/v2";

/// Page size for comment lists.
pub const COMMENT_PAGE_SIZE: usize = 30;

/// Provider error codes carried inside a failed envelope.
const CODE_UNAUTHORIZED: i64 = 401;
const CODE_NOT_FOUND: i64 = 404;

/// Client for the platform's JSON endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Fetch and validate one endpoint, unwrapping `resp_data`.
    async fn call<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.http.get(url, query).await?;
        let status = response.status.as_u16();

        match status {
            401 => return Err(CrawlError::Auth(format!("{} (HTTP 401)", what))),
            403 | 404 => return Err(CrawlError::NotFound(format!("{} (HTTP {})", what, status))),
            _ if !response.is_success() => {
                return Err(CrawlError::provider(status, response.text()));
            }
            _ => {}
        }

        let body = response.text();
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| {
                debug!("Malformed payload for {}: {}", what, e);
                CrawlError::provider(status, body.clone())
            })?;

        if envelope.succeeded == Some(false) {
            let message = envelope.error.unwrap_or_else(|| "request refused".to_string());
            return Err(match envelope.code {
                Some(CODE_UNAUTHORIZED) => CrawlError::Auth(format!("{}: {}", what, message)),
                Some(CODE_NOT_FOUND) => CrawlError::NotFound(format!("{}: {}", what, message)),
                _ => CrawlError::provider(status, body),
            });
        }

        envelope
            .resp_data
            .ok_or_else(|| CrawlError::provider(status, body))
    }

    /// Fetch the group snapshot.
    pub async fn get_group_info(&self, group_id: &str) -> Result<Group> {
        let url = format!("{}/groups/{}", self.base_url, group_id);
        let data: GroupData = self
            .call(&format!("group {}", group_id), &url, &[])
            .await?;
        let group = normalize::group(data.group);
        info!("Group {}: {} ({} members)", group.id, group.name, group.member_count);
        Ok(group)
    }

    /// Fetch one page of topics, newest first.
    ///
    /// `count` is a hint; the provider may return fewer. The returned cursor
    /// is `None` once the provider signals the end of the list.
    pub async fn get_topics(
        &self,
        group_id: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<(Vec<RawTopic>, Option<String>)> {
        let url = format!("{}/groups/{}/topics", self.base_url, group_id);
        let mut query = vec![("scope", "all".to_string()), ("count", count.to_string())];
        if let Some(end_time) = cursor {
            query.push(("end_time", end_time.to_string()));
        }

        let data: TopicsData = self
            .call(&format!("topics of group {}", group_id), &url, &query)
            .await?;

        let next = next_cursor(
            data.has_more,
            data.topics.last().and_then(|t| t.create_time.clone()),
        );
        debug!(
            "Group {}: {} topics, next cursor {:?}",
            group_id,
            data.topics.len(),
            next
        );
        Ok((data.topics, next))
    }

    /// Fetch one page of comments on a topic.
    pub async fn get_comments(
        &self,
        topic_id: &str,
        cursor: Option<&str>,
    ) -> Result<(Vec<RawComment>, Option<String>)> {
        let url = format!("{}/topics/{}/comments", self.base_url, topic_id);
        let mut query = vec![
            ("sort", "desc".to_string()),
            ("count", COMMENT_PAGE_SIZE.to_string()),
        ];
        if let Some(end_time) = cursor {
            query.push(("end_time", end_time.to_string()));
        }

        let data: CommentsData = self
            .call(&format!("comments of topic {}", topic_id), &url, &query)
            .await?;

        let next = next_cursor(
            data.has_more,
            data.comments.last().and_then(|c| c.create_time.clone()),
        );
        Ok((data.comments, next))
    }
}

/// Cursor for the next page, or `None` at the end of the list.
fn next_cursor(has_more: Option<bool>, last_create_time: Option<String>) -> Option<String> {
    if has_more == Some(false) {
        return None;
    }
    last_create_time.filter(|t| !t.is_empty())
}
