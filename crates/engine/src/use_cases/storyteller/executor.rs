//! Executes the storyteller's tool calls against plot, player and combat
//! state.
//!
//! Recoverable problems (schema violations, stale references, invalid
//! frames, unreachable travel) come back as structured `{ok:false}`
//! results so the model can self-correct within the turn. Only storage
//! faults are fatal to the turn.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use storyloom_domain::{
    parse_dice_result, FlagValue, Frame, FrameKind, InventoryItem, ItemId, LocationId,
    PendingCheck, SessionId, SkillCheckResolution, StateMutationBatch, StoryPackage, TokenSpec,
    YieldKind,
};

use crate::infrastructure::ports::{FrameSink, PlayerStateRepo, StoreError, ToolCall};
use crate::use_cases::combat::{CombatEngine, CombatError};
use crate::use_cases::plot::{AdvanceOutcome, PlotError, PlotStates, TravelOutcome};
use crate::use_cases::resolver;

/// Fatal tool-execution failure. Everything else is reported back to the
/// model as a recoverable `{ok:false}` result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Control-flow signal raised by a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSignal {
    /// `yield_to_player` was invoked: the turn is over.
    Yielded(YieldKind),
    /// A dice-roll frame was emitted: the loop halts, the client rolls.
    DiceRollEmitted,
}

/// Result of one tool call: the JSON handed back to the model, plus an
/// optional control-flow signal.
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub result: serde_json::Value,
    pub signal: Option<ToolSignal>,
}

impl ToolReply {
    fn ok(result: serde_json::Value) -> Self {
        Self {
            result,
            signal: None,
        }
    }

    fn recoverable(error: impl Into<String>) -> Self {
        Self {
            result: json!({"ok": false, "error": error.into()}),
            signal: None,
        }
    }

    fn with_signal(result: serde_json::Value, signal: ToolSignal) -> Self {
        Self {
            result,
            signal: Some(signal),
        }
    }
}

// ── Tool input shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ReadPlotStateInput {
    #[serde(default)]
    player_query: String,
}

#[derive(Debug, Deserialize)]
struct BuildFrameInput {
    kind: FrameKind,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StatAction {
    SetStat,
    AdjustStat,
    AddItem,
    RemoveItem,
}

#[derive(Debug, Deserialize)]
struct MutatePlayerStatsInput {
    action: StatAction,
    #[serde(default)]
    stat_name: Option<String>,
    #[serde(default)]
    value: Option<i64>,
    /// Bulk form: several stats in one call.
    #[serde(default)]
    updates: Option<std::collections::BTreeMap<String, i64>>,
    #[serde(default)]
    item: Option<InventoryItem>,
    #[serde(default)]
    item_id: Option<ItemId>,
}

#[derive(Debug, Deserialize)]
struct RecordFlagInput {
    flag_name: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TravelInput {
    target_location_id: LocationId,
}

#[derive(Debug, Deserialize)]
struct CompleteEncounterInput {
    encounter_id: storyloom_domain::EncounterId,
    #[serde(default)]
    advance_location: bool,
}

#[derive(Debug, Deserialize)]
struct InitializeCombatInput {
    setting: String,
    tokens: Vec<TokenSpec>,
    #[serde(default)]
    terrain: Vec<storyloom_domain::TerrainCell>,
}

#[derive(Debug, Deserialize)]
struct InjectCombatEventInput {
    events: Vec<storyloom_domain::CombatEvent>,
}

#[derive(Debug, Deserialize)]
struct YieldInput {
    waiting_for: YieldKind,
}

// ── Executor ─────────────────────────────────────────────────────────────

pub struct ToolExecutor {
    plots: Arc<PlotStates>,
    combat: Arc<CombatEngine>,
    players: Arc<dyn PlayerStateRepo>,
    frames: Arc<dyn FrameSink>,
}

impl ToolExecutor {
    pub fn new(
        plots: Arc<PlotStates>,
        combat: Arc<CombatEngine>,
        players: Arc<dyn PlayerStateRepo>,
        frames: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            plots,
            combat,
            players,
            frames,
        }
    }

    /// Execute one tool call. Calls within a step are applied by the loop
    /// sequentially, in array order, with no rollback.
    pub async fn execute(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        tracing::debug!(%session_id, tool = %call.name, "Executing tool call");
        match call.name.as_str() {
            "read_plot_state" => self.read_plot_state(session_id, package, call).await,
            "build_frame" => self.build_frame(session_id, call).await,
            "mutate_player_stats" => self.mutate_player_stats(session_id, call).await,
            "record_flag" => self.record_flag(session_id, call).await,
            "travel" => self.travel(session_id, package, call).await,
            "complete_encounter" => self.complete_encounter(session_id, package, call).await,
            "initialize_combat" => self.initialize_combat(session_id, call).await,
            "inject_combat_event" => self.inject_combat_event(session_id, call).await,
            "yield_to_player" => self.yield_to_player(call),
            other => {
                tracing::warn!(tool = %other, "Unknown tool call");
                Ok(ToolReply::recoverable(format!("unknown tool '{other}'")))
            }
        }
    }

    fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T, ToolReply> {
        serde_json::from_value(call.arguments.clone()).map_err(|e| {
            ToolReply::recoverable(format!("invalid arguments for '{}': {}", call.name, e))
        })
    }

    /// Map plot-layer errors: storage faults are fatal, stale session
    /// references are recoverable.
    fn plot_reply(error: PlotError) -> Result<ToolReply, ToolError> {
        match error {
            PlotError::Store(e) => Err(ToolError::Store(e)),
            other => Ok(ToolReply::recoverable(other.to_string())),
        }
    }

    fn combat_reply(error: CombatError) -> Result<ToolReply, ToolError> {
        match error {
            CombatError::Store(e) => Err(ToolError::Store(e)),
            other => Ok(ToolReply::recoverable(other.to_string())),
        }
    }

    async fn read_plot_state(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: ReadPlotStateInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        let state = match self.plots.read(session_id).await {
            Ok(state) => state,
            Err(e) => return Self::plot_reply(e),
        };

        let resolved = resolver::resolve(package, &state, &input.player_query, None);
        let (location_name, connections, beat) = package
            .find_location(&state.current_location)
            .map(|(_, loc)| {
                (
                    loc.name.clone(),
                    loc.connections.clone(),
                    loc.beat(state.current_beat).unwrap_or_default().to_string(),
                )
            })
            .unwrap_or_default();

        let mut pending_events = Vec::new();
        if let Some(complication) = &state.active_complication {
            pending_events.push(format!("complication: {}", complication.description));
        }
        for threshold in &state.opposing_force.escalation_history {
            pending_events.push(format!("opposing force escalation at tick {threshold}"));
        }
        if state.pending_check.is_some() {
            pending_events.push("a dice roll is outstanding".to_string());
        }

        Ok(ToolReply::ok(json!({
            "location": state.current_location,
            "location_name": location_name,
            "act": state.current_act,
            "beat": {"index": state.current_beat, "description": beat},
            "triggered_world_info": resolved.world_info,
            "active_flags": state.flags,
            "available_connections": connections,
            "available_encounters": resolved.available_encounters,
            "pending_events": pending_events,
        })))
    }

    async fn build_frame(
        &self,
        session_id: SessionId,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: BuildFrameInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        let frame = Frame::new(input.kind, input.payload);
        if let Err(e) = frame.validate() {
            return Ok(ToolReply::recoverable(e.to_string()));
        }

        // A dice-roll frame arms the pending check before halting: the
        // next turn's [dice-result] token is banded against it.
        if frame.kind == FrameKind::DiceRoll {
            let stat = frame
                .payload
                .get("stat")
                .and_then(|v| v.as_str())
                .unwrap_or("luck")
                .to_string();
            let modifier = match self.players.load_or_default(session_id).await {
                Ok(player) => player.stat_modifier(&stat),
                Err(e) => return Err(ToolError::Store(e)),
            };
            let mut state = match self.plots.read(session_id).await {
                Ok(state) => state,
                Err(e) => return Self::plot_reply(e),
            };
            state.pending_check = Some(PendingCheck { stat, modifier });
            if let Err(e) = self.plots.save(&state).await {
                return Self::plot_reply(e);
            }

            self.frames.emit(session_id, frame).await;
            return Ok(ToolReply::with_signal(
                json!({"ok": true, "halted": "dice-roll"}),
                ToolSignal::DiceRollEmitted,
            ));
        }

        self.frames.emit(session_id, frame).await;
        Ok(ToolReply::ok(json!({"ok": true})))
    }

    async fn mutate_player_stats(
        &self,
        session_id: SessionId,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: MutatePlayerStatsInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        let mut player = self.players.load_or_default(session_id).await?;

        match input.action {
            StatAction::SetStat => match (input.updates, input.stat_name, input.value) {
                (Some(updates), _, _) => {
                    for (name, value) in updates {
                        player.set_stat(name, value);
                    }
                }
                (None, Some(name), Some(value)) => player.set_stat(name, value),
                _ => {
                    return Ok(ToolReply::recoverable(
                        "set_stat requires updates, or stat_name and value",
                    ))
                }
            },
            StatAction::AdjustStat => match (input.updates, input.stat_name, input.value) {
                (Some(updates), _, _) => {
                    for (name, delta) in updates {
                        player.adjust_stat(name, delta);
                    }
                }
                (None, Some(name), Some(delta)) => {
                    player.adjust_stat(name, delta);
                }
                _ => {
                    return Ok(ToolReply::recoverable(
                        "adjust_stat requires updates, or stat_name and value",
                    ))
                }
            },
            StatAction::AddItem => {
                let Some(item) = input.item else {
                    return Ok(ToolReply::recoverable("add_item requires item"));
                };
                player.add_item(item);
            }
            StatAction::RemoveItem => {
                let Some(item_id) = input.item_id else {
                    return Ok(ToolReply::recoverable("remove_item requires item_id"));
                };
                if player.remove_item(&item_id).is_none() {
                    return Ok(ToolReply::recoverable(format!(
                        "player does not carry item '{item_id}'"
                    )));
                }
            }
        }

        self.players.save(&player).await?;
        Ok(ToolReply::ok(json!({
            "ok": true,
            "stats": player.stats,
            "inventory": player.inventory,
        })))
    }

    async fn record_flag(
        &self,
        session_id: SessionId,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: RecordFlagInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        let value = match &input.value {
            serde_json::Value::Bool(b) => FlagValue::Bool(*b),
            serde_json::Value::Number(n) if n.as_i64().is_some() => {
                FlagValue::Number(n.as_i64().unwrap_or_default())
            }
            serde_json::Value::String(s) => FlagValue::Text(s.clone()),
            other => {
                return Ok(ToolReply::recoverable(format!(
                    "flag value must be boolean, integer or string, got {other}"
                )))
            }
        };

        match self.plots.record_flag(session_id, &input.flag_name, value).await {
            Ok(_) => Ok(ToolReply::ok(json!({"ok": true, "flag": input.flag_name}))),
            Err(e) => Self::plot_reply(e),
        }
    }

    async fn travel(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: TravelInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        match self
            .plots
            .travel(session_id, package, &input.target_location_id)
            .await
        {
            Ok((_, TravelOutcome::Moved { location })) => {
                Ok(ToolReply::ok(json!({"ok": true, "new_location": location})))
            }
            Ok((_, TravelOutcome::Rejected { valid_options })) => Ok(ToolReply::ok(json!({
                "ok": false,
                "error": format!("'{}' is not reachable from here", input.target_location_id),
                "valid_options": valid_options,
            }))),
            Err(e) => Self::plot_reply(e),
        }
    }

    async fn complete_encounter(
        &self,
        session_id: SessionId,
        package: &StoryPackage,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: CompleteEncounterInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        let batch = StateMutationBatch {
            exhaust_encounters: vec![input.encounter_id.clone()],
            ..Default::default()
        };
        let state = match self.plots.apply_mutations(session_id, package, &batch).await {
            Ok(state) => state,
            Err(e) => return Self::plot_reply(e),
        };

        if !input.advance_location {
            return Ok(ToolReply::ok(json!({
                "ok": true,
                "exhausted": input.encounter_id,
            })));
        }

        match self
            .plots
            .complete_and_advance(session_id, package, &state.current_location.clone(), None)
            .await
        {
            Ok((_, AdvanceOutcome::Advanced { location })) => Ok(ToolReply::ok(json!({
                "ok": true,
                "exhausted": input.encounter_id,
                "advanced_to": location,
            }))),
            Ok((_, AdvanceOutcome::StoryComplete)) => Ok(ToolReply::ok(json!({
                "ok": true,
                "exhausted": input.encounter_id,
                "story_complete": true,
            }))),
            Err(e) => Self::plot_reply(e),
        }
    }

    async fn initialize_combat(
        &self,
        session_id: SessionId,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: InitializeCombatInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        match self
            .combat
            .initialize(session_id, &input.setting, input.tokens, input.terrain)
            .await
        {
            Ok(state) => Ok(ToolReply::ok(CombatEngine::frame_data(&state))),
            Err(e) => Self::combat_reply(e),
        }
    }

    async fn inject_combat_event(
        &self,
        session_id: SessionId,
        call: &ToolCall,
    ) -> Result<ToolReply, ToolError> {
        let input: InjectCombatEventInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };

        match self.combat.inject(session_id, &input.events).await {
            Ok(state) => Ok(ToolReply::ok(CombatEngine::frame_data(&state))),
            Err(e) => Self::combat_reply(e),
        }
    }

    fn yield_to_player(&self, call: &ToolCall) -> Result<ToolReply, ToolError> {
        let input: YieldInput = match Self::parse_args(call) {
            Ok(input) => input,
            Err(reply) => return Ok(reply),
        };
        Ok(ToolReply::with_signal(
            json!({"ok": true}),
            ToolSignal::Yielded(input.waiting_for),
        ))
    }
}

/// Band a leading `[dice-result] N` token against the session's pending
/// check, consuming it. Returns the stripped action text and resolution.
pub async fn consume_dice_result(
    plots: &PlotStates,
    session_id: SessionId,
    action: &str,
) -> Result<(String, Option<SkillCheckResolution>), PlotError> {
    let Some((roll, rest)) = parse_dice_result(action) else {
        return Ok((action.to_string(), None));
    };

    let mut state = plots.read(session_id).await?;
    let Some(pending) = state.pending_check.take() else {
        // A stray dice token with nothing to answer: treat as plain text.
        return Ok((action.to_string(), None));
    };

    let resolution = SkillCheckResolution::resolve(pending.stat, roll, pending.modifier);
    plots.save(&state).await?;
    tracing::info!(
        %session_id,
        total = resolution.total,
        outcome = resolution.outcome.as_str(),
        "Dice result banded"
    );
    Ok((rest.to_string(), Some(resolution)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::infrastructure::cache::PlotStateCache;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::memory_store::MemoryStore;
    use crate::test_fixtures::{sample_package, CollectingFrameSink};
    use crate::use_cases::combat::CombatEngine;
    use serde_json::json;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_t".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    async fn executor() -> (ToolExecutor, Arc<CollectingFrameSink>, SessionId, StoryPackage) {
        let package = sample_package();
        let store = Arc::new(MemoryStore::new());
        store.put_package(package.clone());
        let frames = Arc::new(CollectingFrameSink::default());
        let plots = Arc::new(PlotStates::new(
            Arc::new(PlotStateCache::new(store.clone())),
            Arc::new(SystemClock),
        ));
        let session = SessionId::new();
        plots
            .init_if_absent(session, &package)
            .await
            .expect("seed");
        let executor = ToolExecutor::new(
            plots,
            Arc::new(CombatEngine::new(store.clone())),
            store,
            frames.clone(),
        );
        (executor, frames, session, package)
    }

    #[tokio::test]
    async fn unknown_tool_is_recoverable() {
        let (executor, _, session, package) = executor().await;
        let reply = executor
            .execute(session, &package, &call("summon_dragon", json!({})))
            .await
            .expect("no fatal error");
        assert_eq!(reply.result["ok"], false);
        assert!(reply.signal.is_none());
    }

    #[tokio::test]
    async fn schema_violation_is_rejected_before_execution() {
        let (executor, _, session, package) = executor().await;
        // kind must be a known frame kind
        let reply = executor
            .execute(
                session,
                &package,
                &call("build_frame", json!({"kind": "hologram", "payload": {}})),
            )
            .await
            .expect("no fatal error");
        assert_eq!(reply.result["ok"], false);
    }

    #[tokio::test]
    async fn invalid_frame_payload_is_recoverable() {
        let (executor, frames, session, package) = executor().await;
        let reply = executor
            .execute(
                session,
                &package,
                &call("build_frame", json!({"kind": "choice", "payload": {"text": "?"}})),
            )
            .await
            .expect("no fatal error");
        assert_eq!(reply.result["ok"], false);
        assert!(frames.frames().is_empty(), "invalid frame must not emit");
    }

    #[tokio::test]
    async fn bulk_stat_updates_apply() {
        let (executor, _, session, package) = executor().await;
        let reply = executor
            .execute(
                session,
                &package,
                &call(
                    "mutate_player_stats",
                    json!({"action": "adjust_stat", "updates": {"nerve": 2, "grit": -1}}),
                ),
            )
            .await
            .expect("no fatal error");
        assert_eq!(reply.result["stats"]["nerve"], 2);
        assert_eq!(reply.result["stats"]["grit"], -1);
    }

    #[tokio::test]
    async fn yield_raises_the_terminal_signal() {
        let (executor, _, session, package) = executor().await;
        let reply = executor
            .execute(
                session,
                &package,
                &call("yield_to_player", json!({"waiting_for": "dice-result"})),
            )
            .await
            .expect("no fatal error");
        assert_eq!(
            reply.signal,
            Some(ToolSignal::Yielded(YieldKind::DiceResult))
        );
    }
}
