//! The Director: one policy-level model call per turn.
//!
//! Reads plot state plus resolver output and produces a DirectionPack:
//! a brief for the storyteller and a typed mutation batch. Parsing is
//! availability-over-strictness: a malformed model response yields the
//! neutral fallback pack, never an error.

use std::sync::Arc;

use storyloom_domain::{DirectionPack, PlotState, SkillCheckResolution, StoryPackage};

use crate::infrastructure::llm_json;
use crate::infrastructure::ports::{ChatMessage, LlmError, LlmPort, LlmRequest};
use crate::use_cases::resolver::ResolvedContext;

const DIRECTOR_SYSTEM_PROMPT: &str = "You are the story director for an interactive narrative. \
You never write prose for the player. You read the situation and answer with a single JSON \
object: {\"brief\": string, \"mutations\": {\"progression_delta\": int, \"force_ticks\": int, \
\"beat_delta\": int, \"off_path\": bool, \"character_updates\": [{\"character\", \"location\", \
\"disposition\"}], \"complication\": {\"op\": \"set\"|\"clear\", ...} | null, \
\"exhaust_encounters\": [string], \"inject_encounters\": [{\"location\", \"encounter\"}], \
\"notes\": object | null}, \"suggested_encounter\": string | null}. \
Omit any field you do not need. The brief tells the storyteller what this turn should \
accomplish and how it should feel.";

/// Everything the Director reads for one turn.
pub struct DirectorInput<'a> {
    pub package: &'a StoryPackage,
    pub state: &'a PlotState,
    pub resolved: &'a ResolvedContext,
    pub player_action: &'a str,
    /// Present when this turn answers a dice-roll frame.
    pub check: Option<&'a SkillCheckResolution>,
}

/// The policy step of the two-phase turn pipeline.
pub struct Director {
    llm: Arc<dyn LlmPort>,
}

impl Director {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    /// Run the policy call. Infrastructure failures propagate; malformed
    /// model output does not.
    pub async fn direct(&self, input: &DirectorInput<'_>) -> Result<DirectionPack, LlmError> {
        let prompt = build_prompt(input);
        let request = LlmRequest::new(vec![ChatMessage::user(prompt)])
            .with_system_prompt(DIRECTOR_SYSTEM_PROMPT)
            .with_temperature(0.7);

        let response = self.llm.generate(request).await?;
        Ok(parse_direction(&response.content))
    }
}

/// Decode the Director's JSON, falling back to the neutral pack on any
/// shape problem.
fn parse_direction(raw: &str) -> DirectionPack {
    match llm_json::decode::<DirectionPack>(raw) {
        Ok(pack) => pack,
        Err(e) => {
            tracing::warn!(error = %e, "Director response unparseable, using fallback pack");
            DirectionPack::fallback()
        }
    }
}

fn build_prompt(input: &DirectorInput<'_>) -> String {
    let state = input.state;
    let mut sections = Vec::new();

    sections.push(format!("Premise: {}", input.package.premise));

    if let Some((act, location)) = input.package.find_location(&state.current_location) {
        sections.push(format!(
            "Position: act \"{}\", location \"{}\" ({}), beat {} of {}",
            act.title,
            location.name,
            location.description,
            state.current_beat + 1,
            location.beats.len().max(1)
        ));
        if let Some(beat) = location.beat(state.current_beat) {
            sections.push(format!("Current beat: {beat}"));
        }
    }

    sections.push(format!(
        "Turn {} | progression {} | off-path turns {} | opposing force tick {}",
        state.turn_count,
        state.global_progression,
        state.off_path_turns,
        state.opposing_force.current_tick
    ));

    if let Some(complication) = &state.active_complication {
        let remaining = u64::from(complication.max_turns)
            .saturating_sub(state.turn_count.saturating_sub(complication.injected_at_turn));
        sections.push(format!(
            "Active complication ({} turns left): {}",
            remaining, complication.description
        ));
    }

    if !state.flags.is_empty() {
        let flags: Vec<String> = state
            .flags
            .iter()
            .map(|(name, value)| format!("{name}={value:?}"))
            .collect();
        sections.push(format!("Flags: {}", flags.join(", ")));
    }

    if !state.character_states.is_empty() {
        let present: Vec<String> = state
            .character_states
            .iter()
            .filter(|(_, cs)| cs.location.as_ref() == Some(&state.current_location))
            .map(|(id, cs)| format!("{} ({})", id, cs.disposition))
            .collect();
        if !present.is_empty() {
            sections.push(format!("Characters present: {}", present.join(", ")));
        }
    }

    if !input.resolved.available_encounters.is_empty() {
        let pool: Vec<String> = input
            .resolved
            .available_encounters
            .iter()
            .map(|e| format!("{} (priority {}): {}", e.id, e.priority, e.title))
            .collect();
        sections.push(format!("Available encounters:\n{}", pool.join("\n")));
    }

    if !state.story_summary.is_empty() {
        sections.push(format!("Story so far: {}", state.story_summary));
    }

    if !state.director_notes.is_null() {
        sections.push(format!("Your notes from last turn: {}", state.director_notes));
    }

    if let Some(check) = input.check {
        sections.push(format!("Dice result to honor: {}", check.describe()));
    }

    sections.push(format!("Player action: {}", input.player_action));

    sections.join("\n\n")
}
