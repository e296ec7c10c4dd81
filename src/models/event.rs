use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which feed an event came from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Blogpost,
    RedditDigest,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Blogpost => write!(f, "blogpost"),
            SourceType::RedditDigest => write!(f, "reddit_digest"),
        }
    }
}

/// A normalized notification derived from one feed entry.
///
/// Fields are private so an event can't be altered after construction.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Event {
    source: SourceType,
    title: String,
    link: String,
    description: String,
    timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(
        source: SourceType,
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            source,
            title: title.into(),
            link: link.into(),
            description: description.into(),
            timestamp,
        }
    }

    pub fn source(&self) -> SourceType {
        self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Ascending by timestamp, events without one last.
    pub fn cmp_by_time(&self, other: &Event) -> Ordering {
        match (self.timestamp, other.timestamp) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(secs: Option<i64>) -> Event {
        Event::new(
            SourceType::Blogpost,
            "title",
            "https://example.com",
            "desc",
            secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        )
    }

    #[test]
    fn test_cmp_by_time_orders_ascending() {
        let older = event_at(Some(100));
        let newer = event_at(Some(200));
        assert_eq!(older.cmp_by_time(&newer), Ordering::Less);
        assert_eq!(newer.cmp_by_time(&older), Ordering::Greater);
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let mut events = vec![event_at(None), event_at(Some(5)), event_at(Some(1))];
        events.sort_by(|a, b| a.cmp_by_time(b));
        assert_eq!(events[0].timestamp().map(|t| t.timestamp()), Some(1));
        assert_eq!(events[1].timestamp().map(|t| t.timestamp()), Some(5));
        assert_eq!(events[2].timestamp(), None);
    }

    #[test]
    fn test_source_type_display() {
        assert_eq!(SourceType::Blogpost.to_string(), "blogpost");
        assert_eq!(SourceType::RedditDigest.to_string(), "reddit_digest");
    }
}
