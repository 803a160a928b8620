//! In-memory state store adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use lector_core::ports::{StateStore, StateStoreError};
use lector_core::{PlaybackState, TabId};

/// [`StateStore`] over a process-local map. The production host supplies a
/// session-storage-backed implementation; this one serves embedded use and
/// tests.
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<TabId, PlaybackState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, tab: TabId) -> Result<Option<PlaybackState>, StateStoreError> {
        Ok(self.states.lock().await.get(&tab).cloned())
    }

    async fn save(&self, tab: TabId, state: PlaybackState) -> Result<(), StateStoreError> {
        self.states.lock().await.insert(tab, state);
        Ok(())
    }

    async fn remove(&self, tab: TabId) -> Result<(), StateStoreError> {
        self.states.lock().await.remove(&tab);
        Ok(())
    }
}
