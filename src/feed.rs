//! Feed fetcher - normalized access to the external social-content provider
//!
//! Wraps the provider's "recent posts by user" endpoint behind the
//! [`FeedSource`] trait so the monitor loop (and its tests) never talk HTTP
//! directly. Fetch failures are member-local: the monitor logs them and
//! moves on, and the next scheduled tick acts as the retry.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::models::Post;

/// A read-only source of recent posts for an external member identifier
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch up to `limit` recent posts for the given external identifier,
    /// newest first. Implementations do not retry internally.
    async fn fetch_recent(&self, external_id: &str, limit: u32) -> Result<Vec<Post>>;
}

/// Upstream response envelope
#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    posts: Vec<UpstreamPost>,
}

/// A post as the provider returns it, before normalization
#[derive(Debug, Deserialize)]
struct UpstreamPost {
    id: String,
    #[serde(default)]
    text: String,
    /// RFC 3339 timestamp
    timestamp: String,
    #[serde(default)]
    author_id: String,
}

/// HTTP-backed feed source
pub struct HttpFeedSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_recent(&self, external_id: &str, limit: u32) -> Result<Vec<Post>> {
        let url = format!(
            "{}/users/{}/posts?limit={}",
            self.base_url, external_id, limit
        );

        let response = self
            .client
            .get(&url)
            .header("api_key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "feed request for {} returned HTTP {}",
                external_id,
                response.status()
            )));
        }

        let body: FeedResponse = response.json().await?;
        Ok(normalize_posts(body.posts, external_id))
    }
}

/// Normalize upstream posts, skipping any with an unparseable timestamp
fn normalize_posts(upstream: Vec<UpstreamPost>, external_id: &str) -> Vec<Post> {
    upstream
        .into_iter()
        .filter_map(|p| match parse_timestamp(&p.timestamp) {
            Some(ts) => Some(Post {
                id: p.id,
                text: p.text,
                timestamp: ts,
                author_id: if p.author_id.is_empty() {
                    external_id.to_string()
                } else {
                    p.author_id
                },
            }),
            None => {
                debug!(
                    post_id = %p.id,
                    timestamp = %p.timestamp,
                    "Skipping post with unparseable timestamp"
                );
                None
            }
        })
        .collect()
}

/// Parse an RFC 3339 timestamp into epoch milliseconds
fn parse_timestamp(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let ts = parse_timestamp("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(ts, 1_714_564_800_000);
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn normalization_skips_bad_timestamps_and_fills_author() {
        let upstream = vec![
            UpstreamPost {
                id: "p1".to_string(),
                text: "hello".to_string(),
                timestamp: "2024-05-01T12:00:00Z".to_string(),
                author_id: String::new(),
            },
            UpstreamPost {
                id: "p2".to_string(),
                text: "broken".to_string(),
                timestamp: "yesterday".to_string(),
                author_id: "alice".to_string(),
            },
        ];

        let posts = normalize_posts(upstream, "alice");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p1");
        assert_eq!(posts[0].author_id, "alice");
    }
}
