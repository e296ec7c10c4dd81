use super::{FeedEntry, FeedFetcher, FetchResult};
use crate::errors::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const ACCEPT: &str = "application/rss+xml, application/rdf+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, text/xml;q=0.8";
const USER_AGENT: &str = concat!("feedrelay/", env!("CARGO_PKG_VERSION"));

/// `FeedFetcher` over HTTP, parsing with feed-rs.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    /// No timeout unless one is given; the fetch blocks as long as the server
    /// keeps the connection open.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| FetchError::Network {
            url: String::new(),
            source: e,
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let network = |source| FetchError::Network {
            url: url.to_string(),
            source,
        };

        // See: https://stackoverflow.com/a/7001617/5155484
        let response = self
            .client
            .get(url)
            .header("Accept", ACCEPT)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        log::debug!("Feed {url} status {status}");
        if !status.is_success() {
            return Ok(FetchResult {
                status: status.as_u16(),
                entries: Vec::new(),
            });
        }

        let body = response.bytes().await.map_err(network)?;
        let entries = parse_entries(&body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;

        Ok(FetchResult {
            status: status.as_u16(),
            entries,
        })
    }
}

/// Parse a feed document into entries, in document order.
pub fn parse_entries(body: &[u8]) -> Result<Vec<FeedEntry>, feed_rs::parser::ParseFeedError> {
    let parsed = feed_rs::parser::parse(body)?;
    log::debug!("Parsed {} entries", parsed.entries.len());

    let entries = parsed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            // entry.links may be empty
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            FeedEntry {
                id: entry.id,
                title,
                link,
                summary,
                updated: entry.updated.or(entry.published),
            }
        })
        .collect();

    Ok(entries)
}
