use super::snapshot::{self, Snapshot};
use crate::errors::StoreError;
use crate::models::destination::{DestinationId, DestinationSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BotState {
    version: u32,
    destinations: BTreeMap<DestinationId, DestinationSettings>,
}

impl Default for BotState {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            destinations: BTreeMap::new(),
        }
    }
}

impl Snapshot for BotState {
    const VERSION: u32 = 1;
}

/// Per-destination settings, created lazily with defaults and persisted on
/// every change.
pub struct DestinationStore {
    path: PathBuf,
    state: Mutex<BotState>,
}

impl DestinationStore {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state: BotState = snapshot::read_or_default(&path);
        log::debug!("{} known destinations", state.destinations.len());
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Ids of every destination that has settings.
    pub async fn ids(&self) -> Vec<DestinationId> {
        let state = self.state.lock().await;
        state.destinations.keys().cloned().collect()
    }

    /// Settings for `id`, creating and persisting the defaults on first access.
    pub async fn get(&self, id: &DestinationId) -> DestinationSettings {
        let mut state = self.state.lock().await;
        if let Some(settings) = state.destinations.get(id) {
            return settings.clone();
        }

        log::info!("New destination {id}, using default settings");
        let settings = DestinationSettings::default();
        state.destinations.insert(id.clone(), settings.clone());
        if let Err(e) = snapshot::write(&self.path, &*state).await {
            log::error!("Failed to persist bot state: {e}");
        }
        settings
    }

    /// Apply `change` to the settings of `id` and persist immediately.
    ///
    /// The in-memory change stands even if the write fails; the error is
    /// returned so the caller can tell the user.
    pub async fn update<F>(&self, id: &DestinationId, change: F) -> Result<DestinationSettings, StoreError>
    where
        F: FnOnce(&mut DestinationSettings),
    {
        let mut state = self.state.lock().await;
        let settings = state.destinations.entry(id.clone()).or_default();
        change(settings);
        let updated = settings.clone();
        snapshot::write(&self.path, &*state).await?;
        Ok(updated)
    }

    /// Forget `id` and persist. Returns whether it had settings.
    pub async fn remove(&self, id: &DestinationId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.destinations.remove(id).is_none() {
            return Ok(false);
        }
        snapshot::write(&self.path, &*state).await?;
        Ok(true)
    }

    pub async fn save(&self) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        snapshot::write(&self.path, &*state).await
    }

    pub async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            log::error!("Failed to persist bot state: {e}");
        }
    }
}
