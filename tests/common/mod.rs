#![allow(dead_code)]

use async_trait::async_trait;
use chrono::DateTime;
use feedrelay::errors::{FetchError, TransportError};
use feedrelay::feed::{FeedEntry, FeedFetcher, FetchResult};
use feedrelay::models::destination::{ChannelRef, Destination};
use feedrelay::transport::{ChatTransport, Identity, TransportEvent};
use feedrelay::AppConfig;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.feeder.state_file = dir.join("feeder_state.json");
    config.feeder.polling_interval = 1;
    config.feeder.fetch_reddit = false;
    config.dispatcher.state_file = dir.join("bot_state.json");
    config.dispatcher.rate_limit_ms = 0;
    config.dispatcher.reconnect_cooldown_secs = 1;
    config
}

pub fn entry(id: &str, title: &str, secs: i64) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        title: title.to_string(),
        link: format!("https://example.com/{id}"),
        summary: String::new(),
        updated: DateTime::from_timestamp(secs, 0),
    }
}

/// Poll `check` until it holds, panicking after five seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Serves the same entries on every fetch.
pub struct StaticFetcher {
    entries: Mutex<Vec<FeedEntry>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResult::ok(self.entries.lock().unwrap().clone()))
    }
}

/// Chat transport that records sends. `connect` waits until the gate is open.
pub struct FakeChat {
    destinations: Vec<Destination>,
    sent: Mutex<Vec<(ChannelRef, String)>>,
    gate: watch::Sender<bool>,
    connects: AtomicUsize,
}

impl FakeChat {
    pub fn new(destinations: Vec<Destination>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            destinations,
            sent: Mutex::new(Vec::new()),
            gate,
            connects: AtomicUsize::new(0),
        }
    }

    /// Hold `connect` until `open` is called.
    pub fn closed(destinations: Vec<Destination>) -> Self {
        let chat = Self::new(destinations);
        chat.gate.send_replace(false);
        chat
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(ChannelRef, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Second line of every sent message, which is the event title.
    pub fn sent_titles(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|(_, text)| text.lines().nth(1).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl ChatTransport for FakeChat {
    async fn connect(&self) -> Result<Identity, TransportError> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| TransportError::Api("gate dropped".to_string()))?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Identity {
            id: "1".to_string(),
            username: "relay_bot".to_string(),
        })
    }

    async fn poll_events(&self) -> Result<Vec<TransportEvent>, TransportError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Vec::new())
    }

    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.clone(), text.to_string()));
        Ok(())
    }

    async fn destinations(&self) -> Vec<Destination> {
        self.destinations.clone()
    }

    async fn is_admin(&self, _destination: &Destination, _user_id: &str) -> Result<bool, TransportError> {
        Ok(true)
    }

    async fn resolve_channel(&self, _name: &str) -> Result<Option<ChannelRef>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) {}
}
