use std::fmt;
use tokio::sync::watch;

/// Transport connectivity, published by the supervisor and read by the
/// dispatcher's ready gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    ShutDown,
}

impl ConnectionState {
    pub fn channel() -> (watch::Sender<ConnectionState>, watch::Receiver<ConnectionState>) {
        watch::channel(ConnectionState::Disconnected)
    }

    pub fn is_ready(&self) -> bool {
        *self == ConnectionState::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::ShutDown => write!(f, "shut down"),
        }
    }
}
