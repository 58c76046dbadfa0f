//! Combat engine: the nested tactical state machine behind the
//! storyteller's `initialize_combat` / `inject_combat_event` tools.
//!
//! The mechanics live in the domain (`CombatState`); this use case owns
//! persistence and the frame-data projection handed back to the model.

use std::sync::Arc;

use serde_json::json;
use storyloom_domain::{
    CombatEvent, CombatState, DomainError, SessionId, TerrainCell, TokenSpec,
};

use crate::infrastructure::ports::{CombatStateRepo, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("No active combat for session {0}")]
    NotActive(SessionId),
}

pub struct CombatEngine {
    repo: Arc<dyn CombatStateRepo>,
}

impl CombatEngine {
    pub fn new(repo: Arc<dyn CombatStateRepo>) -> Self {
        Self { repo }
    }

    /// Start a tactical encounter for the session, replacing any stale
    /// completed combat row.
    pub async fn initialize(
        &self,
        session_id: SessionId,
        setting: &str,
        tokens: Vec<TokenSpec>,
        terrain: Vec<TerrainCell>,
    ) -> Result<CombatState, CombatError> {
        if let Some(existing) = self.repo.load(session_id).await? {
            if !existing.is_complete {
                return Err(CombatError::Domain(DomainError::invalid_state_transition(
                    "combat already in progress",
                )));
            }
            self.repo.clear(session_id).await?;
        }

        let state = CombatState::initialize(session_id, setting, tokens, terrain);
        self.repo.save(&state).await?;
        tracing::info!(
            %session_id,
            tokens = state.tokens.len(),
            "Combat initialized"
        );
        Ok(state)
    }

    /// Apply an ordered event batch atomically and persist the result.
    pub async fn inject(
        &self,
        session_id: SessionId,
        events: &[CombatEvent],
    ) -> Result<CombatState, CombatError> {
        let mut state = self
            .repo
            .load(session_id)
            .await?
            .ok_or(CombatError::NotActive(session_id))?;

        state.apply_events(events)?;
        self.repo.save(&state).await?;

        if state.is_complete {
            tracing::info!(%session_id, result = ?state.result, "Combat complete");
        }
        Ok(state)
    }

    pub async fn current(&self, session_id: SessionId) -> Result<Option<CombatState>, CombatError> {
        Ok(self.repo.load(session_id).await?)
    }

    /// Project combat state into the payload of a tactical-map frame.
    pub fn frame_data(state: &CombatState) -> serde_json::Value {
        json!({
            "combat": {
                "setting": state.setting,
                "round": state.round,
                "phase": state.phase,
                "tokens": state.tokens,
                "terrain": state.terrain,
                "turn_order": state.turn_order,
                "active_token": state.active_token,
                "is_complete": state.is_complete,
                "result": state.result,
                // Only the recent tail; the full log stays server-side
                "log": state.log.iter().rev().take(8).rev().collect::<Vec<_>>(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::MemoryStore;
    use storyloom_domain::{CombatResult, GridPosition, TokenId, TokenKind};

    fn spec(id: &str, kind: TokenKind) -> TokenSpec {
        TokenSpec {
            id: TokenId::new(id),
            name: id.to_string(),
            kind,
            position: GridPosition { x: 0, y: 0 },
            hp: Some(6),
            max_hp: Some(6),
            attack: None,
            defense: None,
            move_range: None,
            attack_range: None,
        }
    }

    fn engine() -> CombatEngine {
        CombatEngine::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn initialize_rejects_double_start() {
        let engine = engine();
        let session = SessionId::new();

        engine
            .initialize(session, "pier", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect("first init");

        let err = engine
            .initialize(session, "pier", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect_err("second init should fail");
        assert!(matches!(err, CombatError::Domain(_)));
    }

    #[tokio::test]
    async fn ending_combat_allows_a_fresh_start() {
        let engine = engine();
        let session = SessionId::new();

        engine
            .initialize(session, "pier", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect("init");
        engine
            .inject(
                session,
                &[CombatEvent::EndCombat {
                    result: CombatResult::Escape,
                    message: None,
                }],
            )
            .await
            .expect("end");

        engine
            .initialize(session, "rooftop", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect("restart after completion");
    }

    #[tokio::test]
    async fn inject_without_combat_is_not_active() {
        let engine = engine();
        let err = engine
            .inject(SessionId::new(), &[CombatEvent::AdvancePhase])
            .await
            .expect_err("no combat");
        assert!(matches!(err, CombatError::NotActive(_)));
    }

    #[tokio::test]
    async fn failed_batch_is_not_persisted() {
        let engine = engine();
        let session = SessionId::new();
        engine
            .initialize(session, "pier", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect("init");

        let err = engine
            .inject(
                session,
                &[
                    CombatEvent::LogMessage {
                        message: "a feint".to_string(),
                    },
                    CombatEvent::RemoveToken {
                        token: TokenId::new("phantom"),
                    },
                ],
            )
            .await
            .expect_err("invalid batch");
        assert!(matches!(err, CombatError::Domain(_)));

        let state = engine.current(session).await.expect("load").expect("some");
        assert!(state.log.is_empty(), "partial batch must not persist");
    }

    #[tokio::test]
    async fn frame_data_carries_the_grid() {
        let engine = engine();
        let session = SessionId::new();
        let state = engine
            .initialize(session, "pier", vec![spec("hero", TokenKind::Player)], vec![])
            .await
            .expect("init");

        let data = CombatEngine::frame_data(&state);
        assert_eq!(data["combat"]["round"], 1);
        assert_eq!(data["combat"]["tokens"][0]["id"], "hero");
    }
}
