use super::types::{CycleOutcome, SourceConfig};
use crate::{
    bus::EventBus,
    feed::{normalize, FeedEntry, FeedFetcher},
    models::event::Event,
    store::DedupStore,
};
use futures_util::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Polls one source and publishes entries it hasn't seen before.
pub struct SourcePoller {
    source: SourceConfig,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<DedupStore>,
    bus: Arc<EventBus>,
}

impl SourcePoller {
    pub fn new(
        source: SourceConfig,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<DedupStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            source,
            fetcher,
            store,
            bus,
        }
    }

    /// Poll until cancelled. State is persisted after every cycle and once
    /// more on the way out.
    pub async fn run(self, token: CancellationToken) {
        log::info!(
            "Polling {} every {}s ({})",
            self.source.url,
            self.source.interval.as_secs(),
            self.source.kind
        );

        loop {
            let cycle = AssertUnwindSafe(self.poll_once()).catch_unwind();
            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                outcome = cycle => outcome,
            };
            match outcome {
                Ok(CycleOutcome::Published(0)) => {
                    log::debug!("No new {} entries", self.source.kind)
                }
                Ok(CycleOutcome::Published(n)) => {
                    log::info!("Published {n} new {} entries", self.source.kind)
                }
                Ok(CycleOutcome::Failed) => {}
                Err(_) => log::error!("Poll cycle for {} panicked", self.source.kind),
            }

            self.store.save_logged().await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.source.interval) => {}
            }
        }

        self.store.save_logged().await;
        log::info!("Stopped polling {}", self.source.kind);
    }

    /// One fetch, filter, record, publish cycle. Never fails: fetch problems
    /// are logged and turn the cycle into a no-op.
    pub async fn poll_once(&self) -> CycleOutcome {
        let kind = self.source.kind;
        let result = match self.fetcher.fetch(&self.source.url).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Error getting {kind} feed: {e}");
                return CycleOutcome::Failed;
            }
        };
        if !result.is_ok() {
            log::warn!(
                "Got non-success response for {kind} feed {}: {}",
                self.source.url,
                result.status
            );
            return CycleOutcome::Failed;
        }

        let mut new_ids = Vec::new();
        let mut batch_ids = HashSet::new();
        let mut events = Vec::new();
        for entry in result.entries {
            if let Some(user) = &self.source.profile_user {
                if normalize::is_profile_boilerplate(&entry.title, user) {
                    log::debug!("Skipping profile entry '{}'", entry.title);
                    continue;
                }
            }
            if batch_ids.contains(&entry.id) || self.store.is_seen(kind, &entry.id).await {
                continue;
            }

            log::info!("New {kind} entry, '{}'", entry.title);
            batch_ids.insert(entry.id.clone());
            new_ids.push(entry.id.clone());
            events.push(self.to_event(entry));
        }

        // entries come newest first
        let newest = events.first().cloned();
        self.store.record(kind, new_ids, newest).await;

        for event in &events {
            let failed = self.bus.publish(event).await;
            if failed > 0 {
                log::debug!("{failed} listeners failed on '{}'", event.title());
            }
        }

        CycleOutcome::Published(events.len())
    }

    fn to_event(&self, entry: FeedEntry) -> Event {
        let mut description = normalize::to_plain_text(&entry.summary);
        if let Some(limit) = self.source.description_limit() {
            description = normalize::excerpt(&description, limit);
        }
        Event::new(
            self.source.kind,
            entry.title,
            entry.link,
            description,
            entry.updated,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedEntry, FetchResult};
    use crate::models::event::SourceType;
    use crate::test_helpers::{entry, FakeFetcher, RecordingListener};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        fetcher: Arc<FakeFetcher>,
        store: Arc<DedupStore>,
        listener: Arc<RecordingListener>,
        poller: SourcePoller,
    }

    async fn fixture(kind: SourceType) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        let store = Arc::new(DedupStore::load(dir.path().join("feeder.json"), None));
        let bus = Arc::new(EventBus::new());
        let listener = Arc::new(RecordingListener::new("recorder"));
        bus.subscribe(listener.clone()).await;
        let source = SourceConfig {
            kind,
            url: "https://example.com/feed".to_string(),
            interval: Duration::from_millis(10),
            profile_user: match kind {
                SourceType::RedditDigest => Some("SirBelvedere".to_string()),
                SourceType::Blogpost => None,
            },
        };
        let poller = SourcePoller::new(source, fetcher.clone(), store.clone(), bus);
        Fixture {
            _dir: dir,
            fetcher,
            store,
            listener,
            poller,
        }
    }

    #[tokio::test]
    async fn test_second_poll_of_same_feed_is_noop() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(vec![
            entry("2", "Second", Some(200)),
            entry("1", "First", Some(100)),
        ]));

        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(2));
        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(0));

        let titles: Vec<String> = f
            .listener
            .events()
            .iter()
            .map(|e| e.title().to_string())
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_seen_id_not_republished_when_content_changes() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher
            .set(FetchResult::ok(vec![entry("guid-1", "Original", Some(1))]));
        f.poller.poll_once().await;

        let mut edited = entry("guid-1", "Edited title", Some(2));
        edited.summary = "new body".to_string();
        f.fetcher.set(FetchResult::ok(vec![edited]));

        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(0));
        assert_eq!(f.listener.events().len(), 1);
    }

    #[tokio::test]
    async fn test_same_title_different_ids_both_published() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(vec![
            entry("a", "Patch", Some(2)),
            entry("b", "Patch", Some(1)),
        ]));

        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(2));
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_batch_published_once() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(vec![
            entry("a", "One", Some(2)),
            entry("a", "One again", Some(1)),
        ]));

        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(1));
    }

    #[tokio::test]
    async fn test_profile_boilerplate_is_filtered() {
        let f = fixture(SourceType::RedditDigest).await;
        f.fetcher.set(FetchResult::ok(vec![
            entry("t1_x", "u/SirBelvedere on r/DotA2", Some(2)),
            entry("t3_y", "7.06f patch notes", Some(1)),
        ]));

        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(1));
        assert_eq!(f.listener.events()[0].title(), "7.06f patch notes");
        assert!(!f.store.is_seen(SourceType::RedditDigest, "t1_x").await);
    }

    #[tokio::test]
    async fn test_descriptions_are_normalized() {
        let f = fixture(SourceType::Blogpost).await;
        let mut blog = entry("1", "Post", Some(1));
        blog.summary = "<p>Hello &amp; welcome</p><!--c-->".to_string();
        f.fetcher.set(FetchResult::ok(vec![blog]));

        f.poller.poll_once().await;

        assert_eq!(f.listener.events()[0].description(), "Hello & welcome");
    }

    #[tokio::test]
    async fn test_digest_descriptions_are_truncated() {
        let f = fixture(SourceType::RedditDigest).await;
        let mut digest = entry("t3_1", "Patch", Some(1));
        digest.summary = format!("<div>{}</div>", "a".repeat(250));
        f.fetcher.set(FetchResult::ok(vec![digest]));

        f.poller.poll_once().await;

        let description = f.listener.events()[0].description().to_string();
        assert_eq!(description, format!("{}…", "a".repeat(100)));
    }

    #[tokio::test]
    async fn test_short_digest_still_ends_with_ellipsis() {
        let f = fixture(SourceType::RedditDigest).await;
        let mut digest = entry("t3_2", "Patch", Some(1));
        digest.summary = "<p>Short digest</p>".to_string();
        f.fetcher.set(FetchResult::ok(vec![digest]));

        f.poller.poll_once().await;

        assert_eq!(f.listener.events()[0].description(), "Short digest…");
    }

    #[tokio::test]
    async fn test_newest_new_entry_becomes_last_emitted() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(vec![entry("1", "Old", Some(1))]));
        f.poller.poll_once().await;
        f.fetcher.set(FetchResult::ok(vec![
            entry("3", "Newest", Some(3)),
            entry("2", "Middle", Some(2)),
            entry("1", "Old", Some(1)),
        ]));
        f.poller.poll_once().await;

        let last = f.store.last_emitted(SourceType::Blogpost).await.unwrap();
        assert_eq!(last.title(), "Newest");
    }

    #[tokio::test]
    async fn test_fetch_failures_are_noops() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult {
            status: 503,
            entries: vec![entry("1", "Hidden", Some(1))],
        });
        assert_eq!(f.poller.poll_once().await, CycleOutcome::Failed);

        f.fetcher.fail_with_parse_error();
        assert_eq!(f.poller.poll_once().await, CycleOutcome::Failed);

        assert!(f.listener.events().is_empty());
        assert!(!f.store.is_seen(SourceType::Blogpost, "1").await);
    }

    #[tokio::test]
    async fn test_empty_feed_is_noop() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(Vec::<FeedEntry>::new()));
        assert_eq!(f.poller.poll_once().await, CycleOutcome::Published(0));
    }

    #[tokio::test]
    async fn test_run_persists_and_stops_on_cancel() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.set(FetchResult::ok(vec![entry("1", "Post", Some(1))]));
        let path = f.store.path().to_path_buf();
        let token = CancellationToken::new();
        let handle = tokio::spawn(f.poller.run(token.clone()));

        for _ in 0..100 {
            if f.fetcher.calls() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap();

        assert!(f.fetcher.calls() >= 2);
        assert_eq!(f.listener.events().len(), 1);
        let reloaded = DedupStore::load(&path, None);
        assert!(reloaded.is_seen(SourceType::Blogpost, "1").await);
    }

    #[tokio::test]
    async fn test_loop_survives_failing_fetches() {
        let f = fixture(SourceType::Blogpost).await;
        f.fetcher.fail_with_parse_error();
        let token = CancellationToken::new();
        let handle = tokio::spawn(f.poller.run(token.clone()));

        for _ in 0..100 {
            if f.fetcher.calls() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(f.fetcher.calls() >= 3);
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }
}
