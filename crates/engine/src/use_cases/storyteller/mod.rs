//! The storyteller tool loop: the turn executor.
//!
//! Iterates model steps, each invoking zero or more tools from the fixed
//! vocabulary, until `yield_to_player` is called, a dice-roll frame halts
//! the turn, or the step budget runs out. Tool calls within a step are
//! applied sequentially against plot/combat state before the next model
//! step runs.

mod executor;
mod tools;

pub use executor::{consume_dice_result, ToolError, ToolExecutor, ToolReply, ToolSignal};
pub use tools::build_storyteller_tools;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use storyloom_domain::{
    core_frame_guide, extended_frame_guide, extended_kinds_mentioned, DirectionPack, Frame,
    FrameKind, PlotState, SessionId, SkillCheckResolution, StoryPackage, YieldKind,
};

use crate::infrastructure::ports::{
    ChatMessage, FrameSink, LlmError, LlmPort, LlmRequest, StoreError,
};

#[derive(Debug, Clone)]
pub struct StorytellerConfig {
    /// Fail-safe terminal condition if yield is never called.
    pub step_budget: usize,
    pub temperature: f32,
}

impl Default for StorytellerConfig {
    fn default() -> Self {
        Self {
            step_budget: 12,
            temperature: 0.9,
        }
    }
}

/// Why the loop stopped without an explicit yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A dice-roll frame was emitted; the client owes us a roll.
    DiceRoll,
    /// The step budget ran out before the model yielded.
    StepBudgetExhausted,
}

/// Explicit terminal variant of the loop, not inferred from a missing
/// tool handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Yielded(YieldKind),
    Halted(HaltReason),
}

impl LoopOutcome {
    /// What the client should be waiting for after this outcome.
    pub fn waiting_for(&self) -> YieldKind {
        match self {
            LoopOutcome::Yielded(kind) => *kind,
            LoopOutcome::Halted(HaltReason::DiceRoll) => YieldKind::DiceResult,
            LoopOutcome::Halted(HaltReason::StepBudgetExhausted) => YieldKind::Continue,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorytellerError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Turn cancelled by client disconnect")]
    Cancelled,
}

impl From<ToolError> for StorytellerError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Store(store) => StorytellerError::Store(store),
        }
    }
}

/// Everything the storyteller prompt is assembled from.
pub struct StorytellerInput<'a> {
    pub package: &'a StoryPackage,
    pub state: &'a PlotState,
    pub direction: &'a DirectionPack,
    pub check: Option<&'a SkillCheckResolution>,
}

pub struct Storyteller {
    llm: Arc<dyn LlmPort>,
    executor: ToolExecutor,
    frames: Arc<dyn FrameSink>,
    config: StorytellerConfig,
}

impl Storyteller {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        executor: ToolExecutor,
        frames: Arc<dyn FrameSink>,
        config: StorytellerConfig,
    ) -> Self {
        Self {
            llm,
            executor,
            frames,
            config,
        }
    }

    /// Run the bounded tool loop for one turn. `messages` is the
    /// compressed history plus this turn's player message; the messages
    /// appended during the loop are returned for history persistence.
    pub async fn run(
        &self,
        session_id: SessionId,
        input: &StorytellerInput<'_>,
        mut messages: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<(LoopOutcome, Vec<ChatMessage>), StorytellerError> {
        let system_prompt = build_system_prompt(input);
        let tools = build_storyteller_tools();
        let history_start = messages.len();

        let mut outcome = None;

        for step in 0..self.config.step_budget {
            if cancel.is_cancelled() {
                tracing::info!(%session_id, step, "Turn cancelled mid-loop");
                return Err(StorytellerError::Cancelled);
            }

            let request = LlmRequest::new(messages.clone())
                .with_system_prompt(system_prompt.clone())
                .with_temperature(self.config.temperature);
            let response = self.llm.generate_with_tools(request, tools.clone()).await?;

            if response.tool_calls.is_empty() {
                // Stray prose instead of a tool call: render it as
                // narration so nothing the model wrote is lost, and keep
                // looping until it yields.
                let content = response.content.trim().to_string();
                messages.push(ChatMessage::assistant(content.clone()));
                if !content.is_empty() {
                    tracing::debug!(%session_id, step, "Prose step; emitting as narration");
                    self.frames
                        .emit(
                            session_id,
                            Frame::new(
                                FrameKind::FullScreen,
                                serde_json::json!({"text": content}),
                            ),
                        )
                        .await;
                }
                continue;
            }

            messages.push(ChatMessage::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            // Apply calls sequentially, in array order. A later call in
            // the same step observes the effects of earlier calls.
            for call in &response.tool_calls {
                let reply = self
                    .executor
                    .execute(session_id, input.package, call)
                    .await?;
                messages.push(ChatMessage::tool_result(
                    call.id.clone(),
                    reply.result.to_string(),
                ));

                match reply.signal {
                    Some(ToolSignal::Yielded(kind)) => {
                        outcome = Some(LoopOutcome::Yielded(kind));
                        break;
                    }
                    Some(ToolSignal::DiceRollEmitted) => {
                        outcome = Some(LoopOutcome::Halted(HaltReason::DiceRoll));
                        break;
                    }
                    None => {}
                }
            }

            if let Some(outcome) = outcome {
                let appended = messages.split_off(history_start);
                return Ok((outcome, appended));
            }
        }

        tracing::warn!(
            %session_id,
            budget = self.config.step_budget,
            "Storyteller never yielded; step budget exhausted"
        );
        let appended = messages.split_off(history_start);
        Ok((
            LoopOutcome::Halted(HaltReason::StepBudgetExhausted),
            appended,
        ))
    }
}

fn build_system_prompt(input: &StorytellerInput<'_>) -> String {
    let state = input.state;
    let mut sections = vec![
        "You are the storyteller for an interactive narrative. You act only through tools: \
         read state, emit frames the client renders, mutate state, and always finish by \
         calling yield_to_player. Never answer with plain prose."
            .to_string(),
    ];

    sections.push(format!("Premise: {}", input.package.premise));

    if let Some((act, location)) = input.package.find_location(&state.current_location) {
        sections.push(format!(
            "Scene: act \"{}\", location \"{}\": {}",
            act.title, location.name, location.description
        ));
        if let Some(beat) = location.beat(state.current_beat) {
            sections.push(format!("Current beat: {beat}"));
        }
    }

    if !state.story_summary.is_empty() {
        sections.push(format!("Story so far: {}", state.story_summary));
    }

    sections.push(format!("Director's brief: {}", input.direction.brief));

    if let Some(encounter) = &input.direction.suggested_encounter {
        sections.push(format!("Favored encounter: {encounter}"));
    }

    if let Some(check) = input.check {
        sections.push(format!(
            "The player answered the outstanding dice roll. {} Narrate this outcome \
             faithfully; do not soften the band. Emit a skill-check frame reporting it.",
            check.describe()
        ));
    }

    sections.push(core_frame_guide());
    // The extended guide rides along only when the brief calls for it
    if !extended_kinds_mentioned(&input.direction.brief).is_empty() {
        sections.push(extended_frame_guide());
    }

    sections.push(
        "Skill checks use fixed bands over roll + stat modifier: 10+ full success, 7-9 \
         success at a cost, 6 or less a miss. To call for a roll, emit a dice-roll frame \
         and stop; the client rolls."
            .to_string(),
    );

    sections.join("\n\n")
}

#[cfg(test)]
mod prompt_tests {
    use super::*;
    use chrono::Utc;
    use storyloom_domain::{Act, ActId, Location, LocationId, PackageId};

    fn package() -> StoryPackage {
        StoryPackage {
            id: PackageId::new("pkg"),
            title: "Pkg".to_string(),
            premise: "A drowned city resurfaces".to_string(),
            acts: vec![Act {
                id: ActId::new("a1"),
                title: "Landfall".to_string(),
                locations: vec![Location {
                    id: LocationId::new("quay"),
                    name: "Quay".to_string(),
                    description: "Barnacled stone".to_string(),
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

    #[test]
    fn extended_guide_only_when_brief_mentions_it() {
        let package = package();
        let state =
            PlotState::seed(storyloom_domain::SessionId::new(), &package, Utc::now())
                .expect("seed");

        let plain = DirectionPack {
            brief: "Keep it quiet and conversational.".to_string(),
            ..DirectionPack::fallback()
        };
        let prompt = build_system_prompt(&StorytellerInput {
            package: &package,
            state: &state,
            direction: &plain,
            check: None,
        });
        assert!(prompt.contains("Core frame kinds"));
        assert!(!prompt.contains("Extended frame kinds"));

        let fancy = DirectionPack {
            brief: "Stage the revelation as a flashback.".to_string(),
            ..DirectionPack::fallback()
        };
        let prompt = build_system_prompt(&StorytellerInput {
            package: &package,
            state: &state,
            direction: &fancy,
            check: None,
        });
        assert!(prompt.contains("Extended frame kinds"));
    }
}
