use super::types::{Author, DeliveryReport, DispatcherConfig, BANNER, EVERYONE, SEPARATOR};
use crate::{
    bus::Listener,
    errors::ListenerError,
    models::{destination::ChannelRef, event::Event},
    store::DestinationStore,
    tasks::supervisor::ConnectionState,
    transport::ChatTransport,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sends events to every destination once the transport is ready, queueing
/// them until then.
pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    destinations: Arc<DestinationStore>,
    ready: watch::Receiver<ConnectionState>,
    config: DispatcherConfig,
    // held for the whole dispatch, which keeps deliveries in order
    pending: Mutex<Vec<Event>>,
    last_author: std::sync::Mutex<HashMap<ChannelRef, Author>>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        destinations: Arc<DestinationStore>,
        ready: watch::Receiver<ConnectionState>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            transport,
            destinations,
            ready,
            config,
            pending: Mutex::new(Vec::new()),
            last_author: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.borrow().is_ready()
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Remember who spoke last in `channel`.
    pub fn record_author(&self, channel: &ChannelRef, author: Author) {
        self.last_author
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel.clone(), author);
    }

    fn last_author_is_me(&self, channel: &ChannelRef) -> bool {
        self.last_author
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            == Some(&Author::Me)
    }

    /// Deliver `event`, or queue it if the transport isn't ready.
    pub async fn dispatch(&self, event: &Event) -> DeliveryReport {
        let mut pending = self.pending.lock().await;
        if !self.is_ready() {
            log::info!("Queuing '{}' until the chat transport is ready", event.title());
            pending.push(event.clone());
            return DeliveryReport::default();
        }

        // the backlog goes out before anything newer
        let mut report = self.replay(&mut pending).await;
        report.merge(self.deliver(event).await);
        report
    }

    /// Replay the queued backlog, if the transport is ready.
    pub async fn flush_pending(&self) -> DeliveryReport {
        let mut pending = self.pending.lock().await;
        if !self.is_ready() {
            return DeliveryReport::default();
        }
        self.replay(&mut pending).await
    }

    async fn replay(&self, pending: &mut Vec<Event>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if pending.is_empty() {
            return report;
        }

        let backlog = take_backlog(pending, self.config.backlog_limit);
        log::info!("Replaying {} queued updates", backlog.len());
        for event in &backlog {
            report.merge(self.deliver(event).await);
        }
        report
    }

    async fn deliver(&self, event: &Event) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for destination in self.transport.destinations().await {
            let settings = self.destinations.get(&destination.id).await;
            if !settings.post_updates {
                log::debug!("Updates disabled for {}", destination.id);
                continue;
            }

            let channel = settings.channel_for(&destination).clone();
            let continuation = self.last_author_is_me(&channel);
            let text = render_message(event, settings.call_everyone, continuation);

            report.attempted += 1;
            match self.transport.send(&channel, &text).await {
                Ok(()) => {
                    log::info!("Sent '{}' to {}", event.title(), channel);
                    self.record_author(&channel, Author::Me);
                }
                Err(e) => {
                    report.failed += 1;
                    log::error!("Error sending '{}' to {}: {e}", event.title(), channel);
                }
            }

            // Limit the message rate
            if !self.config.rate_limit.is_zero() {
                tokio::time::sleep(self.config.rate_limit).await;
            }
        }

        report
    }

    /// Flush the backlog every time the supervisor reports `Ready`.
    pub fn spawn_ready_watcher(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let mut ready = self.ready.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = ready.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *ready.borrow_and_update();
                        if state.is_ready() {
                            let report = dispatcher.flush_pending().await;
                            if report.failed > 0 {
                                log::warn!("{} backlog sends failed", report.failed);
                            }
                        }
                    }
                }
            }
            log::debug!("Ready watcher stopped");
        })
    }
}

#[async_trait]
impl Listener for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    async fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        let report = self.dispatch(event).await;
        if report.failed > 0 {
            return Err(ListenerError::Delivery {
                failed: report.failed,
                attempted: report.attempted,
            });
        }
        Ok(())
    }
}

/// Sort the queue by time and keep only the newest `limit` events, leaving
/// the queue empty. Undated events only fill slots no dated event claims;
/// they are replayed after the dated ones.
pub(crate) fn take_backlog(pending: &mut Vec<Event>, limit: usize) -> Vec<Event> {
    let mut backlog = std::mem::take(pending);
    // stable, so equal timestamps keep arrival order
    backlog.sort_by(|a, b| a.cmp_by_time(b));
    if backlog.len() <= limit {
        return backlog;
    }

    let mut undated = backlog.split_off(backlog.partition_point(|e| e.timestamp().is_some()));
    let keep_dated = backlog.len().min(limit);
    let keep_undated = limit - keep_dated;
    let dropped = backlog.len() + undated.len() - limit;
    log::info!("Dropping {dropped} older queued updates");

    backlog.drain(..backlog.len() - keep_dated);
    undated.drain(..undated.len() - keep_undated);
    backlog.append(&mut undated);
    backlog
}

pub fn render_message(event: &Event, call_everyone: bool, continuation: bool) -> String {
    let mut message = String::new();
    if call_everyone {
        message.push_str(EVERYONE);
        message.push('\n');
    }
    message.push_str(if continuation { SEPARATOR } else { BANNER });
    message.push('\n');
    message.push_str(event.title());
    message.push('\n');
    message.push_str(event.link());
    message.push_str("\n\n");
    message.push_str(event.description());
    message
}
