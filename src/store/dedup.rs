use super::snapshot::{self, Snapshot};
use crate::errors::StoreError;
use crate::models::event::{Event, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Seen identifiers and last emitted event for one source.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupRecord {
    /// insertion order, oldest first
    seen_ids: Vec<String>,
    last_emitted: Option<Event>,
    #[serde(skip)]
    index: HashSet<String>,
}

impl DedupRecord {
    pub fn is_seen(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn last_emitted(&self) -> Option<&Event> {
        self.last_emitted.as_ref()
    }

    pub fn len(&self) -> usize {
        self.seen_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_ids.is_empty()
    }

    fn insert(&mut self, id: String) -> bool {
        if self.index.insert(id.clone()) {
            self.seen_ids.push(id);
            true
        } else {
            false
        }
    }

    /// Drop the oldest identifiers until at most `max` remain.
    fn retain_newest(&mut self, max: usize) -> usize {
        if self.seen_ids.len() <= max {
            return 0;
        }
        let excess = self.seen_ids.len() - max;
        for id in self.seen_ids.drain(..excess) {
            self.index.remove(&id);
        }
        excess
    }

    fn rebuild_index(&mut self) {
        self.index = self.seen_ids.iter().cloned().collect();
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DedupState {
    version: u32,
    sources: BTreeMap<SourceType, DedupRecord>,
}

impl Default for DedupState {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            sources: BTreeMap::new(),
        }
    }
}

impl Snapshot for DedupState {
    const VERSION: u32 = 1;
}

impl DedupState {
    pub fn record(&self, source: SourceType) -> Option<&DedupRecord> {
        self.sources.get(&source)
    }
}

/// Result of recording a poll cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub added: usize,
    pub evicted: usize,
}

/// Durable per-source record of seen feed entries.
///
/// The state lock is held across the disk write so saves of this store never
/// interleave.
pub struct DedupStore {
    path: PathBuf,
    max_seen_ids: Option<usize>,
    state: Mutex<DedupState>,
}

impl DedupStore {
    /// Load from `path`. A missing or corrupt snapshot yields an empty store.
    pub fn load(path: impl AsRef<Path>, max_seen_ids: Option<usize>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut state: DedupState = snapshot::read_or_default(&path);
        for record in state.sources.values_mut() {
            record.rebuild_index();
        }
        for (source, record) in &state.sources {
            log::debug!("{source}: {} seen ids", record.len());
        }
        Self {
            path,
            max_seen_ids,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_seen(&self, source: SourceType, id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .sources
            .get(&source)
            .map(|r| r.is_seen(id))
            .unwrap_or(false)
    }

    /// Mark `ids` as seen for `source`. `newest` replaces the last emitted
    /// event when given.
    pub async fn record(
        &self,
        source: SourceType,
        ids: impl IntoIterator<Item = String>,
        newest: Option<Event>,
    ) -> RecordOutcome {
        let mut state = self.state.lock().await;
        let record = state.sources.entry(source).or_default();

        let mut outcome = RecordOutcome::default();
        for id in ids {
            if record.insert(id) {
                outcome.added += 1;
            }
        }
        if let Some(event) = newest {
            record.last_emitted = Some(event);
        }
        if let Some(max) = self.max_seen_ids {
            outcome.evicted = record.retain_newest(max);
            if outcome.evicted > 0 {
                log::debug!("Evicted {} old ids for {source}", outcome.evicted);
            }
        }
        outcome
    }

    pub async fn last_emitted(&self, source: SourceType) -> Option<Event> {
        let state = self.state.lock().await;
        state
            .sources
            .get(&source)
            .and_then(|r| r.last_emitted.clone())
    }

    pub async fn seen_count(&self, source: SourceType) -> usize {
        let state = self.state.lock().await;
        state.sources.get(&source).map(|r| r.len()).unwrap_or(0)
    }

    /// Persist the current state.
    pub async fn save(&self) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        snapshot::write(&self.path, &*state).await
    }

    /// Persist, logging instead of returning the error. In-memory state keeps
    /// going and the next save retries.
    pub async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            log::error!("Failed to persist feeder state: {e}");
        }
    }
}
