//! Storage port traits.
//!
//! The relational adapter lives outside this repository; the engine sees
//! one row per session for plot state, player state and combat state, one
//! per package for the static graph, and the per-session conversation
//! history used by the context compressor.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use storyloom_domain::{CombatState, PackageId, PlayerState, PlotState, SessionId, StoryPackage};

use super::error::StoreError;
use super::external::ChatMessage;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageRepo: Send + Sync {
    async fn get(&self, id: &PackageId) -> Result<StoryPackage, StoreError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlotStateRepo: Send + Sync {
    async fn load(&self, session_id: SessionId) -> Result<Option<PlotState>, StoreError>;

    async fn save(&self, state: &PlotState) -> Result<(), StoreError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CombatStateRepo: Send + Sync {
    async fn load(&self, session_id: SessionId) -> Result<Option<CombatState>, StoreError>;

    async fn save(&self, state: &CombatState) -> Result<(), StoreError>;

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlayerStateRepo: Send + Sync {
    async fn load_or_default(&self, session_id: SessionId) -> Result<PlayerState, StoreError>;

    async fn save(&self, state: &PlayerState) -> Result<(), StoreError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn load(&self, session_id: SessionId) -> Result<Vec<ChatMessage>, StoreError>;

    async fn save(&self, session_id: SessionId, messages: &[ChatMessage])
        -> Result<(), StoreError>;
}
