use std::time::Duration;

pub const BANNER: &str = "A new update is here!";
pub const SEPARATOR: &str = "----------------";
pub const EVERYONE: &str = "@everyone";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// pause after each send
    pub rate_limit: Duration,
    /// how many queued events survive a reconnect
    pub backlog_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_millis(100),
            backlog_limit: 4,
        }
    }
}

/// Last author seen in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    Me,
    User(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.attempted += other.attempted;
        self.failed += other.failed;
    }
}
