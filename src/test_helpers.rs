//! Fakes shared by the unit tests.

use crate::bus::Listener;
use crate::errors::{FetchError, ListenerError, TransportError};
use crate::feed::{fetcher::parse_entries, FeedEntry, FeedFetcher, FetchResult};
use crate::models::destination::{ChannelRef, Destination};
use crate::models::event::{Event, SourceType};
use crate::transport::{ChatTransport, Identity, TransportEvent};
use async_trait::async_trait;
use chrono::DateTime;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn entry(id: &str, title: &str, secs: Option<i64>) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        title: title.to_string(),
        link: format!("https://example.com/{id}"),
        summary: String::new(),
        updated: secs.and_then(|s| DateTime::from_timestamp(s, 0)),
    }
}

pub fn event_at(title: &str, secs: Option<i64>) -> Event {
    Event::new(
        SourceType::Blogpost,
        title,
        format!("https://example.com/{title}"),
        "",
        secs.and_then(|s| DateTime::from_timestamp(s, 0)),
    )
}

pub struct RecordingListener {
    name: &'static str,
    events: Mutex<Vec<Event>>,
    log: Option<Arc<Mutex<Vec<&'static str>>>>,
}

impl RecordingListener {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: Mutex::new(Vec::new()),
            log: None,
        }
    }

    /// Also pushes its name to `log` on every event, to check ordering.
    pub fn with_log(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            log: Some(log),
            ..Self::new(name)
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for RecordingListener {
    fn name(&self) -> &str {
        self.name
    }

    async fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        self.events.lock().unwrap().push(event.clone());
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name);
        }
        Ok(())
    }
}

enum FakeResponse {
    Result(FetchResult),
    ParseError,
}

pub struct FakeFetcher {
    response: Mutex<FakeResponse>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            response: Mutex::new(FakeResponse::Result(FetchResult::ok(Vec::new()))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, result: FetchResult) {
        *self.response.lock().unwrap() = FakeResponse::Result(result);
    }

    pub fn fail_with_parse_error(&self) {
        *self.response.lock().unwrap() = FakeResponse::ParseError;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.response.lock().unwrap() {
            FakeResponse::Result(result) => Ok(result.clone()),
            FakeResponse::ParseError => Err(FetchError::Parse {
                url: url.to_string(),
                source: parse_entries(b"not a feed").unwrap_err(),
            }),
        }
    }
}

/// In-memory `ChatTransport` that records what was sent.
#[derive(Default)]
pub struct RecordingTransport {
    destinations: Mutex<Vec<Destination>>,
    sent: Mutex<Vec<(ChannelRef, String)>>,
    failing_channels: Mutex<HashSet<ChannelRef>>,
    admins: Mutex<HashSet<String>>,
    channels: Mutex<HashMap<String, ChannelRef>>,
    events: Mutex<VecDeque<TransportEvent>>,
    connect_failures: AtomicUsize,
    connect_attempts: AtomicUsize,
    fail_poll: AtomicBool,
    disconnected: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_destination(&self, destination: Destination) {
        self.destinations.lock().unwrap().push(destination);
    }

    pub fn fail_sends_to(&self, channel: ChannelRef) {
        self.failing_channels.lock().unwrap().insert(channel);
    }

    pub fn add_admin(&self, user_id: &str) {
        self.admins.lock().unwrap().insert(user_id.to_string());
    }

    pub fn add_channel(&self, name: &str, channel: ChannelRef) {
        self.channels.lock().unwrap().insert(name.to_string(), channel);
    }

    pub fn fail_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_poll(&self) {
        self.fail_poll.store(true, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(ChannelRef, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn connect(&self) -> Result<Identity, TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Api("login refused".to_string()));
        }
        self.disconnected.store(false, Ordering::SeqCst);
        Ok(Identity {
            id: "1".to_string(),
            username: "relay_bot".to_string(),
        })
    }

    async fn poll_events(&self) -> Result<Vec<TransportEvent>, TransportError> {
        if self.fail_poll.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Api("connection reset".to_string()));
        }
        let events: Vec<TransportEvent> = self.events.lock().unwrap().drain(..).collect();
        if events.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(events)
    }

    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        if self.failing_channels.lock().unwrap().contains(channel) {
            return Err(TransportError::Api(format!("can't post to {channel}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.clone(), text.to_string()));
        Ok(())
    }

    async fn destinations(&self) -> Vec<Destination> {
        self.destinations.lock().unwrap().clone()
    }

    async fn is_admin(
        &self,
        _destination: &Destination,
        user_id: &str,
    ) -> Result<bool, TransportError> {
        Ok(self.admins.lock().unwrap().contains(user_id))
    }

    async fn resolve_channel(&self, name: &str) -> Result<Option<ChannelRef>, TransportError> {
        Ok(self.channels.lock().unwrap().get(name).cloned())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}
