//! Cursor pagination with deduplication and a stall-breaker.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::source::PageSource;
use crate::error::CrawlError;
use crate::models::Keyed;

/// Default page size requested from the provider.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Consecutive pages without a new id before pagination gives up.
pub const DEFAULT_STALL_LIMIT: u32 = 3;

/// Why pagination ended.
#[derive(Debug)]
pub enum StopReason {
    /// The requested number of records was collected.
    TargetReached,
    /// The source reported no further pages.
    Exhausted,
    /// Too many consecutive pages repeated already-seen records.
    Stalled,
    /// The configured page limit was hit.
    PageLimit,
    /// A page fetch failed after retries; records before it are kept.
    Failed(CrawlError),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::Exhausted => write!(f, "no more pages"),
            StopReason::Stalled => write!(f, "stalled on repeated pages"),
            StopReason::PageLimit => write!(f, "page limit reached"),
            StopReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Records collected by one pagination run.
#[derive(Debug)]
pub struct CrawlOutcome<T> {
    /// Unique records in retrieval order.
    pub items: Vec<T>,
    /// Pages fetched successfully.
    pub pages: usize,
    pub stop: StopReason,
}

impl<T> CrawlOutcome<T> {
    /// Split into the records and the failure, if any.
    pub fn into_parts(self) -> (Vec<T>, Option<CrawlError>) {
        match self.stop {
            StopReason::Failed(e) => (self.items, Some(e)),
            _ => (self.items, None),
        }
    }
}

/// Drives a [`PageSource`] until a target, the end of data, or a limit.
#[derive(Debug, Clone)]
pub struct Paginator {
    retry: RetryPolicy,
    page_size: usize,
    stall_limit: u32,
    max_pages: Option<usize>,
}

impl Paginator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            page_size: DEFAULT_PAGE_SIZE,
            stall_limit: DEFAULT_STALL_LIMIT,
            max_pages: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_stall_limit(mut self, stall_limit: u32) -> Self {
        self.stall_limit = stall_limit.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Collect records from `source`.
    ///
    /// With a `target`, at most that many records are returned even if the
    /// last page overshoots. Each page fetch is retried on its own; a fetch
    /// that still fails ends the run with whatever was already collected.
    pub async fn collect<S>(&self, source: &S, target: Option<usize>) -> CrawlOutcome<S::Item>
    where
        S: PageSource + ?Sized,
    {
        let name = source.describe();
        let mut items: Vec<S::Item> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        let mut stalled = 0;

        let stop = loop {
            if target.is_some_and(|t| items.len() >= t) {
                break StopReason::TargetReached;
            }
            if self.max_pages.is_some_and(|max| pages >= max) {
                info!("{}: stopping at page limit {}", name, pages);
                break StopReason::PageLimit;
            }

            // Full page size even near the target; an inclusive cursor
            // repeats the boundary record.
            let operation = format!("{} page {}", name, pages + 1);

            let page = match self
                .retry
                .run(&operation, || {
                    source.fetch_page(cursor.as_deref(), self.page_size)
                })
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "{} failed, keeping {} records: {}",
                        operation,
                        items.len(),
                        e
                    );
                    break StopReason::Failed(e);
                }
            };
            pages += 1;

            let received = page.items.len();
            let mut fresh = 0;
            for item in page.items {
                if seen.insert(item.key().to_string()) {
                    items.push(item);
                    fresh += 1;
                } else {
                    debug!("{}: dropping repeated id {}", name, item.key());
                }
            }
            debug!(
                "{}: page {} gave {} records, {} new, {} total",
                name,
                pages,
                received,
                fresh,
                items.len()
            );

            if target.is_some_and(|t| items.len() >= t) {
                break StopReason::TargetReached;
            }

            let Some(next) = page.next_cursor else {
                break StopReason::Exhausted;
            };

            if fresh == 0 {
                stalled += 1;
                warn!(
                    "{}: page {} had no new records ({}/{})",
                    name, pages, stalled, self.stall_limit
                );
                if stalled >= self.stall_limit {
                    break StopReason::Stalled;
                }
            } else {
                stalled = 0;
            }

            cursor = Some(next);
        };

        if let Some(t) = target {
            items.truncate(t);
        }

        info!(
            "{}: {} records from {} pages ({})",
            name,
            items.len(),
            pages,
            stop
        );

        CrawlOutcome { items, pages, stop }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::Post;
    use crate::scrapers::source::Page;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted pages and records the cursors it was asked for.
    struct Scripted {
        pages: Mutex<VecDeque<Result<Page<Post>>>>,
        cursors: Mutex<Vec<Option<String>>>,
        repeat_last: Option<Vec<&'static str>>,
    }

    impl Scripted {
        fn new(pages: Vec<Result<Page<Post>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                cursors: Mutex::new(Vec::new()),
                repeat_last: None,
            }
        }

        /// A source that returns the same ids forever.
        fn forever(ids: Vec<&'static str>) -> Self {
            Self {
                repeat_last: Some(ids),
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.cursors.lock().unwrap().len()
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Result<Page<Post>> {
        Ok(Page::new(
            ids.iter().map(|id| Post::new(*id, format!("post {}", id))).collect(),
            next.map(String::from),
        ))
    }

    #[async_trait]
    impl PageSource for Scripted {
        type Item = Post;

        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn fetch_page(&self, cursor: Option<&str>, _count: usize) -> Result<Page<Post>> {
            self.cursors.lock().unwrap().push(cursor.map(String::from));
            if let Some(ids) = &self.repeat_last {
                return page(ids, Some("same"));
            }
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| page(&[], None))
        }
    }

    fn paginator() -> Paginator {
        Paginator::new(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_truncates_to_target() {
        let source = Scripted::new(vec![
            page(&["1", "2", "3"], Some("c1")),
            page(&["4", "5", "6"], Some("c2")),
        ]);

        let outcome = paginator().collect(&source, Some(4)).await;
        assert_eq!(ids(&outcome.items), vec!["1", "2", "3", "4"]);
        assert!(matches!(outcome.stop, StopReason::TargetReached));
        assert_eq!(outcome.pages, 2);
    }

    #[tokio::test]
    async fn test_follows_cursor_until_exhausted() {
        let source = Scripted::new(vec![page(&["1", "2"], Some("t2")), page(&["3"], None)]);

        let outcome = paginator().collect(&source, Some(10)).await;
        assert_eq!(ids(&outcome.items), vec!["1", "2", "3"]);
        assert!(matches!(outcome.stop, StopReason::Exhausted));
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_repeated_ids_kept_once() {
        let source = Scripted::new(vec![
            page(&["1", "2", "3"], Some("c1")),
            page(&["3", "4"], Some("c2")),
            page(&["2", "5"], None),
        ]);

        let outcome = paginator().collect(&source, None).await;
        assert_eq!(ids(&outcome.items), vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_stall_breaker_stops_repeating_source() {
        let source = Scripted::forever(vec!["a", "b"]);

        let outcome = paginator().collect(&source, Some(100)).await;
        assert_eq!(ids(&outcome.items), vec!["a", "b"]);
        assert!(matches!(outcome.stop, StopReason::Stalled));
        // first page is new, then three pages with nothing new
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_progress() {
        let source = Scripted::new(vec![
            page(&["1", "2"], Some("c1")),
            Err(CrawlError::provider(500, "down")),
            Err(CrawlError::provider(500, "down")),
            Err(CrawlError::provider(502, "still down")),
        ]);

        let outcome = paginator().collect(&source, Some(10)).await;
        assert_eq!(ids(&outcome.items), vec!["1", "2"]);
        assert!(matches!(
            outcome.stop,
            StopReason::Failed(CrawlError::Provider { status: 502, .. })
        ));
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_transient_failure_recovered_by_retry() {
        let source = Scripted::new(vec![
            page(&["1"], Some("c1")),
            Err(CrawlError::provider(503, "busy")),
            page(&["2"], None),
        ]);

        let outcome = paginator().collect(&source, None).await;
        assert_eq!(ids(&outcome.items), vec!["1", "2"]);
        assert!(matches!(outcome.stop, StopReason::Exhausted));
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let source = Scripted::new(vec![Err(CrawlError::Auth("expired".into()))]);

        let outcome = paginator().collect(&source, Some(5)).await;
        assert!(outcome.items.is_empty());
        assert!(matches!(outcome.stop, StopReason::Failed(CrawlError::Auth(_))));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let source = Scripted::new(vec![
            page(&["1"], Some("c1")),
            page(&["2"], Some("c2")),
            page(&["3"], Some("c3")),
        ]);

        let outcome = paginator()
            .with_max_pages(Some(2))
            .collect(&source, None)
            .await;
        assert_eq!(ids(&outcome.items), vec!["1", "2"]);
        assert!(matches!(outcome.stop, StopReason::PageLimit));
    }

    /// Pages over fixed ids with the cursor record included in each page.
    struct InclusiveCursor {
        ids: Vec<&'static str>,
        counts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PageSource for InclusiveCursor {
        type Item = Post;

        fn describe(&self) -> String {
            "inclusive".to_string()
        }

        async fn fetch_page(&self, cursor: Option<&str>, count: usize) -> Result<Page<Post>> {
            self.counts.lock().unwrap().push(count);
            let start = cursor
                .and_then(|c| self.ids.iter().position(|id| *id == c))
                .unwrap_or(0);
            let end = (start + count).min(self.ids.len());
            let slice = &self.ids[start..end];
            let next = (end < self.ids.len()).then(|| slice[slice.len() - 1]);
            page(slice, next)
        }
    }

    #[tokio::test]
    async fn test_inclusive_cursor_near_target_does_not_stall() {
        let source = InclusiveCursor {
            ids: vec!["1", "2", "3", "4"],
            counts: Mutex::new(Vec::new()),
        };

        let outcome = paginator()
            .with_page_size(2)
            .collect(&source, Some(3))
            .await;
        assert_eq!(ids(&outcome.items), vec!["1", "2", "3"]);
        assert!(matches!(outcome.stop, StopReason::TargetReached));
        assert_eq!(*source.counts.lock().unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_zero_target_fetches_nothing() {
        let source = Scripted::new(vec![page(&["1"], None)]);
        let outcome = paginator().collect(&source, Some(0)).await;
        assert!(outcome.items.is_empty());
        assert_eq!(source.calls(), 0);
    }
}
