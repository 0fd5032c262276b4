//! Image download for crawled posts.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Post;
use crate::scrapers::HttpClient;

/// Downloads post images next to the exported records.
pub struct MediaFetcher {
    client: HttpClient,
}

impl MediaFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Download every image of `post` that has no local copy yet.
    ///
    /// A failed download is logged and leaves that image pointing at its
    /// remote URL; the post itself is always returned.
    pub async fn fetch_all(&self, mut post: Post, image_dir: &Path) -> Post {
        if post.images.iter().all(|i| i.local_path.is_some()) {
            return post;
        }

        if let Err(e) = tokio::fs::create_dir_all(image_dir).await {
            warn!("Cannot create image dir {}: {}", image_dir.display(), e);
            return post;
        }

        let stem = sanitize_stem(&post.id);
        let mut saved = 0;
        let mut failed = 0;

        for (index, image) in post.images.iter_mut().enumerate() {
            if image.local_path.is_some() {
                continue;
            }

            match self.download(&image.remote_url, &stem, index + 1, image_dir).await {
                Ok(path) => {
                    debug!("Saved {} -> {}", image.remote_url, path.display());
                    image.local_path = Some(path.to_string_lossy().into_owned());
                    saved += 1;
                }
                Err(e) => {
                    warn!("Image {} of post {} not saved: {}", index + 1, post.id, e);
                    failed += 1;
                }
            }
        }

        if saved + failed > 0 {
            info!("Post {}: {} images saved, {} failed", post.id, saved, failed);
        }
        post
    }

    async fn download(
        &self,
        remote_url: &str,
        stem: &str,
        index: usize,
        image_dir: &Path,
    ) -> Result<PathBuf> {
        let url = absolute_url(remote_url);
        let bytes = self.client.get_bytes(&url).await?;

        let ext = infer::get(&bytes)
            .map(|kind| kind.extension().to_string())
            .or_else(|| url_extension(&url))
            .unwrap_or_else(|| "jpg".to_string());

        let path = image_dir.join(format!("{}_{}.{}", stem, index, ext));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

/// Filesystem-safe form of a post id.
fn sanitize_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "post".to_string()
    } else {
        stem
    }
}

/// Image URLs are sometimes protocol-relative.
fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialContext, ImageRef};
    use crate::scrapers::{HeaderRotator, RateGate, RateGateConfig};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn fetcher() -> MediaFetcher {
        MediaFetcher::new(
            HttpClient::new(
                CredentialContext::from_token("T").unwrap(),
                HeaderRotator::new("https://wx.zsxq.com"),
                RateGate::with_config(RateGateConfig::disabled()),
                Duration::from_secs(5),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_failed_image_left_remote_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not an image".to_vec()))
            .mount(&server)
            .await;

        let mut post = Post::new("123:x", "three images");
        post.images = ["1.png", "2.png", "3"]
            .iter()
            .map(|p| ImageRef::remote(format!("{}/{}", server.uri(), p)))
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let post = fetcher().fetch_all(post, dir.path()).await;

        let first = post.images[0].local_path.as_ref().unwrap();
        assert!(first.ends_with("123_x_1.png"));
        assert_eq!(std::fs::read(first).unwrap(), PNG);

        assert!(post.images[1].local_path.is_none());
        assert!(post.images[1].remote_url.ends_with("/2.png"));

        let third = post.images[2].local_path.as_ref().unwrap();
        assert!(third.ends_with("123_x_3.jpg"));
    }

    #[tokio::test]
    async fn test_already_downloaded_skipped() {
        let mut post = Post::new("1", "");
        post.images.push(ImageRef {
            remote_url: "http://127.0.0.1:9/never".to_string(),
            local_path: Some("kept.jpg".to_string()),
        });

        let dir = tempfile::tempdir().unwrap();
        let post = fetcher().fetch_all(post, &dir.path().join("images")).await;
        assert_eq!(post.images[0].local_path.as_deref(), Some("kept.jpg"));
        assert!(!dir.path().join("images").exists());
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(absolute_url("//img.zsxq.com/a.jpg"), "https://img.zsxq.com/a.jpg");
        assert_eq!(
            url_extension("https://img.zsxq.com/a/b.JPEG?x=1"),
            Some("jpeg".to_string())
        );
        assert_eq!(url_extension("https://img.zsxq.com/a/b"), None);
        assert_eq!(sanitize_stem("a/b c"), "a_b_c");
        assert_eq!(sanitize_stem(""), "post");
    }
}
