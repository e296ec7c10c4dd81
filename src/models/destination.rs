use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque platform id of a chat destination (a Telegram chat id, for example).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DestinationId(pub String);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        DestinationId(id.to_string())
    }
}

/// Where a message is actually posted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ChannelRef(pub String);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A destination the transport knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: DestinationId,
    pub default_channel: ChannelRef,
    pub name: Option<String>,
}

impl Destination {
    /// A destination whose default channel is itself, which is how Telegram
    /// chats behave.
    pub fn chat(id: DestinationId, name: Option<String>) -> Self {
        let default_channel = ChannelRef(id.0.clone());
        Self {
            id,
            default_channel,
            name,
        }
    }
}

/// Per-destination delivery settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DestinationSettings {
    pub post_updates: bool,
    /// None means the destination's default channel
    pub target_channel: Option<ChannelRef>,
    pub call_everyone: bool,
    /// placeholder, not read by the dispatcher yet
    pub detailed_patch: bool,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            post_updates: true,
            target_channel: None,
            call_everyone: false,
            detailed_patch: false,
        }
    }
}

impl DestinationSettings {
    pub fn channel_for<'a>(&'a self, destination: &'a Destination) -> &'a ChannelRef {
        self.target_channel
            .as_ref()
            .unwrap_or(&destination.default_channel)
    }
}
