use std::path::PathBuf;
use thiserror::Error;

/// Failures while fetching or parsing a feed. Always recovered by the poller:
/// the cycle becomes a no-op and the next interval retries.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unable to parse feed from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: feed_rs::parser::ParseFeedError,
    },
}

/// Failures talking to the chat platform. Recovered by the connection
/// supervisor's cooldown loop.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No bot token configured")]
    MissingToken,
    #[error("HTTP error talking to chat API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Chat API error: {0}")]
    Api(String),
    #[error("Unexpected chat API response: {0}")]
    Decode(String),
}

/// Failures reading or writing a persisted snapshot.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Snapshot {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("Snapshot {path:?} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("Background write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Whether the error means "a snapshot exists but is unusable", as
    /// opposed to an I/O problem reaching it.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt { .. } | StoreError::UnsupportedVersion { .. }
        )
    }
}

/// Returned by event listeners. The bus logs it and moves on to the next
/// listener.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Delivery failed for {failed} of {attempted} destinations")]
    Delivery { failed: usize, attempted: usize },
    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write default config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("Invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Bad command arguments. Rendered back to the user as a reply.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("Only chat administrators can do that")]
    NotAdmin,
    #[error("Couldn't reach the chat service, try again later")]
    Unavailable,
}
