//! PlotState manager: lazy creation, mutation application, scripted
//! completion and sandbox travel.

use std::sync::Arc;

use storyloom_domain::{
    ActiveComplication, ComplicationChange, DomainError, LocationId, PlotState, SessionId,
    StateMutationBatch, StoryPackage, Successor,
};

use crate::infrastructure::cache::PlotStateCache;
use crate::infrastructure::clock::ClockPort;
use crate::infrastructure::ports::StoreError;

/// Errors from plot-state operations.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("No plot state for session {0}")]
    SessionNotSeeded(SessionId),
}

/// Result of a travel request.
#[derive(Debug, Clone, PartialEq)]
pub enum TravelOutcome {
    Moved {
        location: LocationId,
    },
    /// The target is not connected to the current location. State is
    /// unchanged; `valid_options` lists the actual connections.
    Rejected {
        valid_options: Vec<LocationId>,
    },
}

/// Result of completing the current location.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Advanced { location: LocationId },
    StoryComplete,
}

/// Owns every read and write of the durable per-session narrative state.
pub struct PlotStates {
    states: Arc<PlotStateCache>,
    clock: Arc<dyn ClockPort>,
}

impl PlotStates {
    pub fn new(states: Arc<PlotStateCache>, clock: Arc<dyn ClockPort>) -> Self {
        Self { states, clock }
    }

    /// Lazily create state on a session's first turn, seeded from the
    /// package's first act and first location.
    pub async fn init_if_absent(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
    ) -> Result<PlotState, PlotError> {
        if let Some(existing) = self.states.load(session_id).await? {
            return Ok(existing);
        }
        let state = PlotState::seed(session_id, package, self.clock.now())?;
        self.states.save(&state).await?;
        tracing::info!(%session_id, package = %package.id, "Seeded plot state");
        Ok(state)
    }

    pub async fn read(&self, session_id: SessionId) -> Result<PlotState, PlotError> {
        self.states
            .load(session_id)
            .await?
            .ok_or(PlotError::SessionNotSeeded(session_id))
    }

    /// Apply a Director mutation batch. Progression never decreases here;
    /// negative deltas are clamped and logged, and `exhausted_encounters`
    /// only grows.
    pub async fn apply_mutations(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        batch: &StateMutationBatch,
    ) -> Result<PlotState, PlotError> {
        let mut state = self.read(session_id).await?;

        if batch.progression_delta < 0 {
            tracing::warn!(
                %session_id,
                delta = batch.progression_delta,
                "Ignoring negative progression delta; progression is monotonic"
            );
        } else {
            state.global_progression += batch.progression_delta as u32;
        }

        if batch.force_ticks != 0 {
            let crossed = state.opposing_force.advance(batch.force_ticks);
            for threshold in crossed {
                tracing::info!(%session_id, threshold, "Opposing force escalation");
            }
        }

        if batch.beat_delta > 0 {
            let beat_count = package
                .find_location(&state.current_location)
                .map(|(_, loc)| loc.beats.len() as u32)
                .unwrap_or(0);
            let max_beat = beat_count.saturating_sub(1);
            state.current_beat = (state.current_beat + batch.beat_delta as u32).min(max_beat);
        }

        if batch.off_path {
            state.off_path_turns += 1;
        }

        for update in &batch.character_updates {
            let entry = state
                .character_states
                .entry(update.character.clone())
                .or_insert_with(|| storyloom_domain::CharacterState {
                    location: None,
                    disposition: "neutral".to_string(),
                });
            if let Some(location) = &update.location {
                entry.location = Some(location.clone());
            }
            if let Some(disposition) = &update.disposition {
                entry.disposition = disposition.clone();
            }
        }

        match &batch.complication {
            Some(ComplicationChange::Set {
                description,
                max_turns,
            }) => {
                state.active_complication = Some(ActiveComplication {
                    description: description.clone(),
                    max_turns: *max_turns,
                    injected_at_turn: state.turn_count,
                });
            }
            Some(ComplicationChange::Clear) => state.active_complication = None,
            None => {}
        }

        for id in &batch.exhaust_encounters {
            state.exhaust_encounter(id.clone());
        }
        for injection in &batch.inject_encounters {
            state.inject_encounter(injection.location.clone(), injection.encounter.clone());
        }

        if let Some(notes) = &batch.notes {
            state.director_notes = notes.clone();
        }

        state.updated_at = self.clock.now();
        self.states.save(&state).await?;
        Ok(state)
    }

    pub async fn record_flag(
        &self,
        session_id: SessionId,
        name: &str,
        value: storyloom_domain::FlagValue,
    ) -> Result<PlotState, PlotError> {
        let mut state = self.read(session_id).await?;
        state.record_flag(name, value);
        state.updated_at = self.clock.now();
        self.states.save(&state).await?;
        Ok(state)
    }

    /// Complete a location and advance along the story graph, or to the
    /// explicit next location when the caller supplies one.
    pub async fn complete_and_advance(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        completed: &LocationId,
        explicit_next: Option<&LocationId>,
    ) -> Result<(PlotState, AdvanceOutcome), PlotError> {
        let mut state = self.read(session_id).await?;

        let successor = match explicit_next {
            Some(next) => {
                let (act, location) = package.find_location(next).ok_or_else(|| {
                    DomainError::not_found("Location", next.to_string())
                })?;
                Successor::Next {
                    act: act.id.clone(),
                    location: location.id.clone(),
                }
            }
            None => package
                .successor_of(completed)
                .ok_or_else(|| DomainError::not_found("Location", completed.to_string()))?,
        };

        let outcome = match successor {
            Successor::Next { act, location } => {
                state.arrive_at(act, location.clone());
                tracing::info!(%session_id, %location, "Advanced to next location");
                AdvanceOutcome::Advanced { location }
            }
            Successor::StoryComplete => {
                // The final location stays current; only the counters reset.
                state.current_beat = 0;
                state.off_path_turns = 0;
                tracing::info!(%session_id, "Story complete");
                AdvanceOutcome::StoryComplete
            }
        };

        state.updated_at = self.clock.now();
        self.states.save(&state).await?;
        Ok((state, outcome))
    }

    /// Sandbox travel: the target must be in the current location's
    /// connections. Rejection leaves state untouched and reports the
    /// valid alternatives.
    pub async fn travel(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        target: &LocationId,
    ) -> Result<(PlotState, TravelOutcome), PlotError> {
        let mut state = self.read(session_id).await?;

        let connections = package
            .find_location(&state.current_location)
            .map(|(_, loc)| loc.connections.clone())
            .unwrap_or_default();

        if !connections.contains(target) {
            tracing::debug!(%session_id, %target, "Travel rejected: unreachable");
            return Ok((
                state,
                TravelOutcome::Rejected {
                    valid_options: connections,
                },
            ));
        }

        let (act, location) = package
            .find_location(target)
            .ok_or_else(|| DomainError::not_found("Location", target.to_string()))?;
        state.arrive_at(act.id.clone(), location.id.clone());
        state.updated_at = self.clock.now();
        self.states.save(&state).await?;

        Ok((
            state,
            TravelOutcome::Moved {
                location: target.clone(),
            },
        ))
    }

    /// The explicit reset path for the otherwise-monotonic progression
    /// counter.
    pub async fn reset_progression(&self, session_id: SessionId) -> Result<PlotState, PlotError> {
        let mut state = self.read(session_id).await?;
        state.global_progression = 0;
        state.updated_at = self.clock.now();
        self.states.save(&state).await?;
        Ok(state)
    }

    /// Close a turn: bump the turn counter and persist.
    pub async fn close_turn(&self, session_id: SessionId) -> Result<PlotState, PlotError> {
        let mut state = self.read(session_id).await?;
        state.turn_count += 1;
        state.updated_at = self.clock.now();
        self.states.save(&state).await?;
        Ok(state)
    }

    /// Persist an externally mutated state (summary update, pending check).
    pub async fn save(&self, state: &PlotState) -> Result<(), PlotError> {
        self.states.save(state).await?;
        Ok(())
    }
}
