use crate::errors::ListenerError;
use crate::models::event::Event;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Something that wants to hear about new events.
#[async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> &str;

    async fn on_event(&self, event: &Event) -> Result<(), ListenerError>;
}

/// In-process publish/subscribe bus.
///
/// Listeners run one after another, in subscription order, on the publishing
/// task. A listener that errors or panics is logged and skipped; the rest still
/// get the event and the publisher never sees the failure.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, listener: Arc<dyn Listener>) {
        log::debug!("Listener '{}' subscribed", listener.name());
        self.listeners.write().await.push(listener);
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Deliver `event` to every listener. Returns how many failed.
    pub async fn publish(&self, event: &Event) -> usize {
        // snapshot so a slow listener doesn't hold the lock against subscribe()
        let listeners: Vec<Arc<dyn Listener>> = self.listeners.read().await.clone();

        let mut failed = 0;
        for listener in listeners {
            let result = AssertUnwindSafe(listener.on_event(event))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    log::error!(
                        "Listener '{}' failed on '{}': {e}",
                        listener.name(),
                        event.title()
                    );
                }
                Err(_) => {
                    failed += 1;
                    log::error!(
                        "Listener '{}' panicked on '{}'",
                        listener.name(),
                        event.title()
                    );
                }
            }
        }
        failed
    }
}
