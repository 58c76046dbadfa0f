//! The per-turn pipeline: player action → resolver → Director →
//! mutations → storyteller loop → turn close → compression.
//!
//! Turns for one session are strictly sequential; a per-session gate
//! rejects a second in-flight turn rather than interleaving writers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use storyloom_domain::{
    Frame, FrameKind, PackageId, PlotState, SessionId, YieldKind,
};

use crate::infrastructure::cache::PackageCache;
use crate::infrastructure::ports::{
    ChatMessage, ConversationRepo, FrameSink, LlmError, StoreError,
};
use crate::use_cases::context::{spawn_background_pass, ContextCompressor};
use crate::use_cases::director::{Director, DirectorInput};
use crate::use_cases::plot::{PlotError, PlotStates};
use crate::use_cases::resolver;
use crate::use_cases::storyteller::{
    consume_dice_result, Storyteller, StorytellerError, StorytellerInput,
};

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Infrastructure fault in the model substrate: the turn hard-fails.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Plot error: {0}")]
    Plot(#[from] PlotError),

    #[error("A turn is already in flight for session {0}")]
    TurnInFlight(SessionId),

    #[error("Turn cancelled by client disconnect")]
    Cancelled,
}

impl From<StorytellerError> for TurnError {
    fn from(e: StorytellerError) -> Self {
        match e {
            StorytellerError::Llm(llm) => TurnError::Llm(llm),
            StorytellerError::Store(store) => TurnError::Store(store),
            StorytellerError::Cancelled => TurnError::Cancelled,
        }
    }
}

/// What a completed turn hands back to the transport.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub waiting_for: YieldKind,
    pub state: PlotState,
}

/// Orchestrates one turn end to end.
pub struct TurnRunner {
    packages: Arc<PackageCache>,
    plots: Arc<PlotStates>,
    director: Director,
    storyteller: Storyteller,
    compressor: Arc<ContextCompressor>,
    conversations: Arc<dyn ConversationRepo>,
    frames: Arc<dyn FrameSink>,
    gates: DashMap<SessionId, Arc<tokio::sync::Mutex<()>>>,
}

impl TurnRunner {
    pub fn new(
        packages: Arc<PackageCache>,
        plots: Arc<PlotStates>,
        director: Director,
        storyteller: Storyteller,
        compressor: Arc<ContextCompressor>,
        conversations: Arc<dyn ConversationRepo>,
        frames: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            packages,
            plots,
            director,
            storyteller,
            compressor,
            conversations,
            frames,
            gates: DashMap::new(),
        }
    }

    /// Run one turn. The caller serializes per session; a concurrent call
    /// for the same session is rejected with [`TurnError::TurnInFlight`].
    pub async fn run_turn(
        &self,
        session_id: SessionId,
        package_id: &PackageId,
        action: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let gate = self
            .gates
            .entry(session_id)
            .or_default()
            .clone();
        let _guard = gate
            .try_lock()
            .map_err(|_| TurnError::TurnInFlight(session_id))?;

        let package = self.packages.get(package_id).await?;
        let mut state = self.plots.init_if_absent(session_id, &package).await?;

        // An empty first action only seeds the session and sets the
        // opening scene; the turn counter stays untouched.
        if action.trim().is_empty() {
            self.emit_establishing_frames(session_id, &package, &state)
                .await;
            self.frames
                .turn_complete(session_id, YieldKind::FreeText)
                .await;
            return Ok(TurnOutcome {
                waiting_for: YieldKind::FreeText,
                state,
            });
        }

        if let Some(expired) = state.expire_complication() {
            tracing::info!(%session_id, complication = %expired.description, "Complication expired");
            self.plots.save(&state).await?;
        }

        let location_before = state.current_location.clone();

        // Band an answered dice roll before anything reads the action.
        let (clean_action, check) =
            consume_dice_result(&self.plots, session_id, action).await?;
        if check.is_some() {
            state = self.plots.read(session_id).await?;
        }

        let resolved = resolver::resolve(&package, &state, &clean_action, None);

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        // Policy call and history compression are independent round
        // trips; issue them concurrently.
        let history = self.conversations.load(session_id).await?;
        let director_input = DirectorInput {
            package: &package,
            state: &state,
            resolved: &resolved,
            player_action: &clean_action,
            check: check.as_ref(),
        };
        let (direction, prepared) = tokio::join!(
            self.director.direct(&director_input),
            self.compressor.prepare(history, &state.story_summary),
        );
        let direction = direction?;
        let prepared = prepared?;

        if let Some(summary) = &prepared.new_summary {
            state.story_summary = summary.clone();
            self.plots.save(&state).await?;
            tracing::debug!(%session_id, "History compressed into rolling summary");
        }

        let state = self
            .plots
            .apply_mutations(session_id, &package, &direction.mutations)
            .await?;

        let mut messages = prepared.messages;
        messages.push(ChatMessage::user(action));

        let storyteller_input = StorytellerInput {
            package: &package,
            state: &state,
            direction: &direction,
            check: check.as_ref(),
        };
        let (outcome, appended) = self
            .storyteller
            .run(session_id, &storyteller_input, messages.clone(), cancel)
            .await?;

        messages.extend(appended);
        self.conversations.save(session_id, &messages).await?;

        let state = self.plots.close_turn(session_id).await?;
        let waiting_for = outcome.waiting_for();
        self.frames.turn_complete(session_id, waiting_for).await;

        // A location/act transition warms the summary for the next turn.
        if state.current_location != location_before {
            tracing::info!(
                %session_id,
                from = %location_before,
                to = %state.current_location,
                "Location transition; scheduling background summarization"
            );
            spawn_background_pass(
                Arc::clone(&self.compressor),
                Arc::clone(&self.conversations),
                Arc::clone(&self.plots),
                session_id,
            );
        }

        tracing::info!(
            %session_id,
            turn = state.turn_count,
            waiting_for = waiting_for.as_str(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            waiting_for,
            state,
        })
    }

    async fn emit_establishing_frames(
        &self,
        session_id: SessionId,
        package: &storyloom_domain::StoryPackage,
        state: &PlotState,
    ) {
        let Some((act, location)) = package.find_location(&state.current_location) else {
            return;
        };
        self.frames
            .emit(
                session_id,
                Frame::new(
                    FrameKind::Transition,
                    serde_json::json!({
                        "caption": format!("{} — {}", act.title, location.name),
                    }),
                ),
            )
            .await;
        self.frames
            .emit(
                session_id,
                Frame::new(
                    FrameKind::FullScreen,
                    serde_json::json!({"text": location.description}),
                ),
            )
            .await;
    }
}
