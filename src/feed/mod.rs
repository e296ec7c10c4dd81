pub mod fetcher;
pub mod normalize;

use crate::errors::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use fetcher::HttpFeedFetcher;

/// One parsed feed entry, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// stable identifier from the source (guid / atom id)
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub status: u16,
    pub entries: Vec<FeedEntry>,
}

impl FetchResult {
    pub fn ok(entries: Vec<FeedEntry>) -> Self {
        Self {
            status: 200,
            entries,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Fetches and parses a feed. Non-200 responses come back as a `FetchResult`
/// with that status; network and parse problems as `FetchError`.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}
