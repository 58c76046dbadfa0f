//! In-memory store implementation for development and testing.
//!
//! Backs every storage port with a concurrent map. Plot state goes
//! through the versioned record codec so the persistence shape is
//! exercised even without a relational adapter. Writes are per-call and
//! last-write-wins, matching the engine's stated concurrency contract.

use async_trait::async_trait;
use dashmap::DashMap;
use storyloom_domain::{
    decode_plot_state, encode_plot_state, CombatState, PackageId, PlayerState, PlotState,
    SessionId, StoryPackage,
};

use crate::infrastructure::ports::{
    ChatMessage, CombatStateRepo, ConversationRepo, PackageRepo, PlayerStateRepo, PlotStateRepo,
    StoreError,
};

/// One in-memory store implementing all repo ports.
#[derive(Default)]
pub struct MemoryStore {
    packages: DashMap<PackageId, StoryPackage>,
    /// Encoded records, to keep the codec on the hot path.
    plot_states: DashMap<SessionId, String>,
    combat_states: DashMap<SessionId, CombatState>,
    player_states: DashMap<SessionId, PlayerState>,
    conversations: DashMap<SessionId, Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a story package (test/dev seeding).
    pub fn put_package(&self, package: StoryPackage) {
        self.packages.insert(package.id.clone(), package);
    }
}

#[async_trait]
impl PackageRepo for MemoryStore {
    async fn get(&self, id: &PackageId) -> Result<StoryPackage, StoreError> {
        self.packages
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::not_found("StoryPackage", id.to_string()))
    }
}

#[async_trait]
impl PlotStateRepo for MemoryStore {
    async fn load(&self, session_id: SessionId) -> Result<Option<PlotState>, StoreError> {
        match self.plot_states.get(&session_id) {
            Some(raw) => decode_plot_state(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &PlotState) -> Result<(), StoreError> {
        let encoded =
            encode_plot_state(state).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.plot_states.insert(state.session_id, encoded);
        Ok(())
    }
}

#[async_trait]
impl CombatStateRepo for MemoryStore {
    async fn load(&self, session_id: SessionId) -> Result<Option<CombatState>, StoreError> {
        Ok(self.combat_states.get(&session_id).map(|e| e.clone()))
    }

    async fn save(&self, state: &CombatState) -> Result<(), StoreError> {
        self.combat_states.insert(state.session_id, state.clone());
        Ok(())
    }

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.combat_states.remove(&session_id);
        Ok(())
    }
}

#[async_trait]
impl PlayerStateRepo for MemoryStore {
    async fn load_or_default(&self, session_id: SessionId) -> Result<PlayerState, StoreError> {
        Ok(self
            .player_states
            .get(&session_id)
            .map(|e| e.clone())
            .unwrap_or_else(|| PlayerState::new(session_id)))
    }

    async fn save(&self, state: &PlayerState) -> Result<(), StoreError> {
        self.player_states.insert(state.session_id, state.clone());
        Ok(())
    }
}

#[async_trait]
impl ConversationRepo for MemoryStore {
    async fn load(&self, session_id: SessionId) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .conversations
            .get(&session_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        session_id: SessionId,
        messages: &[ChatMessage],
    ) -> Result<(), StoreError> {
        self.conversations.insert(session_id, messages.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storyloom_domain::{Act, ActId, Location, LocationId};

    fn package() -> StoryPackage {
        StoryPackage {
            id: PackageId::new("pkg"),
            title: "Pkg".to_string(),
            premise: String::new(),
            acts: vec![Act {
                id: ActId::new("a1"),
                title: String::new(),
                locations: vec![Location {
                    id: LocationId::new("l1"),
                    name: String::new(),
                    description: String::new(),
                    beats: vec![],
                    connections: vec![],
                    encounters: vec![],
                    sandbox: false,
                }],
            }],
            world_info: vec![],
            characters: vec![],
        }
    }

    #[tokio::test]
    async fn plot_state_roundtrips_through_the_codec() {
        let store = MemoryStore::new();
        let state = PlotState::seed(SessionId::new(), &package(), Utc::now()).expect("seed");

        PlotStateRepo::save(&store, &state).await.expect("save");
        let loaded = PlotStateRepo::load(&store, state.session_id)
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_package_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(&PackageId::new("absent")).await.expect_err("err");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
