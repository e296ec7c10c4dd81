use crate::errors::TransportError;
use crate::models::destination::{ChannelRef, Destination, DestinationId};
use async_trait::async_trait;

/// Who the bot is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub destination: Destination,
    /// channel the message was posted in, replies go here
    pub channel: ChannelRef,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(IncomingMessage),
    Joined(Destination),
    Left(DestinationId),
}

/// A chat platform connection.
///
/// `connect` logs in, `poll_events` waits for the next batch of incoming
/// events. An error from either ends the session and the supervisor
/// reconnects after its cooldown.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self) -> Result<Identity, TransportError>;

    async fn poll_events(&self) -> Result<Vec<TransportEvent>, TransportError>;

    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError>;

    /// Every destination the bot can currently post to.
    async fn destinations(&self) -> Vec<Destination>;

    async fn is_admin(&self, destination: &Destination, user_id: &str) -> Result<bool, TransportError>;

    /// Look up a channel by user-supplied name. `Ok(None)` if it doesn't exist.
    async fn resolve_channel(&self, name: &str) -> Result<Option<ChannelRef>, TransportError>;

    async fn disconnect(&self);
}
