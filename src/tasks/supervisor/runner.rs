use super::state::ConnectionState;
use crate::{
    commands::CommandHandler,
    errors::TransportError,
    store::DestinationStore,
    tasks::dispatcher::{Author, Dispatcher},
    transport::{ChatTransport, Identity, TransportEvent},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Owns the chat connection: logs in, pumps incoming events and reconnects
/// after a fixed cooldown whenever the session fails. It never gives up; only
/// cancellation stops it.
pub struct ConnectionSupervisor {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<Dispatcher>,
    commands: Arc<CommandHandler>,
    destinations: Arc<DestinationStore>,
    state: watch::Sender<ConnectionState>,
    cooldown: Duration,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<Dispatcher>,
        commands: Arc<CommandHandler>,
        destinations: Arc<DestinationStore>,
        state: watch::Sender<ConnectionState>,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            commands,
            destinations,
            state,
            cooldown,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("Connection {previous} -> {state}");
        }
    }

    pub async fn run(self, token: CancellationToken) {
        loop {
            self.set_state(ConnectionState::Connecting);

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.run_session(&token) => result,
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    log::error!("Chat transport failed: {e}");
                    log::info!(
                        "Reconnecting in {} seconds",
                        self.cooldown.as_secs_f32()
                    );
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }

        self.transport.disconnect().await;
        self.set_state(ConnectionState::ShutDown);
        log::info!("Connection supervisor stopped");
    }

    /// One logged-in session. Returns `Ok` only on cancellation.
    async fn run_session(&self, token: &CancellationToken) -> Result<(), TransportError> {
        let me = self.transport.connect().await?;
        log::info!("Logged in as {} - {}", me.username, me.id);
        self.set_state(ConnectionState::Ready);

        loop {
            let events = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                events = self.transport.poll_events() => events?,
            };
            for event in events {
                self.handle_event(&me, event).await;
            }
        }
    }

    async fn handle_event(&self, me: &Identity, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => {
                log::info!(
                    "Message from {}@{}: {}",
                    msg.author_name,
                    msg.channel,
                    msg.text
                );
                self.dispatcher
                    .record_author(&msg.channel, Author::User(msg.author_id.clone()));
                // make sure the destination has settings on disk
                self.destinations.get(&msg.destination.id).await;

                if let Some(reply) = self.commands.handle(me, &msg).await {
                    match self.transport.send(&msg.channel, &reply).await {
                        Ok(()) => self.dispatcher.record_author(&msg.channel, Author::Me),
                        Err(e) => log::error!("Error replying in {}: {e}", msg.channel),
                    }
                }
            }
            TransportEvent::Joined(destination) => {
                log::info!(
                    "Joined {} ({})",
                    destination.id,
                    destination.name.as_deref().unwrap_or("unnamed")
                );
                self.destinations.get(&destination.id).await;
            }
            TransportEvent::Left(id) => {
                log::info!("Removed from {id}");
                if let Err(e) = self.destinations.remove(&id).await {
                    log::error!("Failed to forget destination {id}: {e}");
                }
            }
        }
    }
}
