use crate::bus::EventBus;
use crate::commands::CommandHandler;
use crate::config::AppConfig;
use crate::feed::FeedFetcher;
use crate::models::destination::DestinationId;
use crate::store::{DedupStore, DestinationStore};
use crate::tasks::dispatcher::Dispatcher;
use crate::tasks::feed_poller::{SourceConfig, SourcePoller};
use crate::tasks::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::transport::ChatTransport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The wired-up pipeline: pollers publish on the bus, the dispatcher listens
/// and the supervisor keeps the chat connection alive.
pub struct App {
    sources: Vec<SourceConfig>,
    fetcher: Arc<dyn FeedFetcher>,
    feeder: Arc<DedupStore>,
    destinations: Arc<DestinationStore>,
    bus: Arc<EventBus>,
    dispatcher: Arc<Dispatcher>,
    state: watch::Receiver<ConnectionState>,
    supervisor: ConnectionSupervisor,
}

impl App {
    /// Load persisted state and connect the components. `make_transport` gets
    /// the destination ids known from previous runs.
    pub async fn build<F>(config: &AppConfig, fetcher: Arc<dyn FeedFetcher>, make_transport: F) -> Self
    where
        F: FnOnce(Vec<DestinationId>) -> Arc<dyn ChatTransport>,
    {
        let feeder = Arc::new(DedupStore::load(
            &config.feeder.state_file,
            config.feeder.max_seen_ids,
        ));
        let destinations = Arc::new(DestinationStore::load(&config.dispatcher.state_file));
        let transport = make_transport(destinations.ids().await);

        let (state_tx, state_rx) = ConnectionState::channel();
        let dispatcher = Arc::new(Dispatcher::new(
            transport.clone(),
            destinations.clone(),
            state_rx.clone(),
            config.dispatcher(),
        ));
        let bus = Arc::new(EventBus::new());
        bus.subscribe(dispatcher.clone()).await;

        let commands = Arc::new(CommandHandler::new(
            transport.clone(),
            destinations.clone(),
            feeder.clone(),
        ));
        let supervisor = ConnectionSupervisor::new(
            transport,
            dispatcher.clone(),
            commands,
            destinations.clone(),
            state_tx,
            config.reconnect_cooldown(),
        );

        Self {
            sources: config.sources(),
            fetcher,
            feeder,
            destinations,
            bus,
            dispatcher,
            state: state_rx,
            supervisor,
        }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Run every task until `token` is cancelled, then flush state to disk.
    pub async fn run(self, token: CancellationToken) {
        if self.sources.is_empty() {
            log::warn!("All sources are disabled, nothing will be polled");
        }

        let mut tasks: Vec<(String, JoinHandle<()>)> = Vec::new();
        for source in self.sources {
            let name = format!("{} poller", source.kind);
            let poller = SourcePoller::new(
                source,
                self.fetcher.clone(),
                self.feeder.clone(),
                self.bus.clone(),
            );
            tasks.push((name, tokio::spawn(poller.run(token.clone()))));
        }
        tasks.push((
            "ready watcher".to_string(),
            self.dispatcher.spawn_ready_watcher(token.clone()),
        ));
        tasks.push((
            "connection supervisor".to_string(),
            tokio::spawn(self.supervisor.run(token.clone())),
        ));

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                log::error!("Task '{name}' ended abnormally: {e}");
            }
        }

        self.feeder.save_logged().await;
        self.destinations.save_logged().await;
        log::info!("Shutdown complete");
    }
}
