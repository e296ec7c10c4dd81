use crate::models::event::SourceType;
use std::time::Duration;

/// Reddit descriptions are cut to this many characters.
pub const DIGEST_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceType,
    pub url: String,
    pub interval: Duration,
    /// Reddit user whose profile boilerplate entries are skipped
    pub profile_user: Option<String>,
}

impl SourceConfig {
    pub fn description_limit(&self) -> Option<usize> {
        match self.kind {
            SourceType::Blogpost => None,
            SourceType::RedditDigest => Some(DIGEST_DESCRIPTION_CHARS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// fetched fine, this many new events published
    Published(usize),
    Failed,
}
