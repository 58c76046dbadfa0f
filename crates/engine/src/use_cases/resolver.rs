//! WorldInfo / encounter resolver.
//!
//! A pure, stateless function over the static story graph, the current
//! plot state, the player's text and the current beat description. World
//! info triggers on case-insensitive whole-word keyword matches; the
//! encounter pool unions runtime injections with the static graph at read
//! time.

use regex_lite::RegexBuilder;
use storyloom_domain::{Encounter, EncounterId, PlotState, StoryPackage, WorldInfoEntry};

/// Resolver output for one turn.
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    /// Triggered lore, in package order.
    pub world_info: Vec<WorldInfoEntry>,
    /// Encounters available at the current location (static minus
    /// exhausted, plus injected).
    pub available_encounters: Vec<Encounter>,
    /// The encounter the storyteller should favor, if any.
    pub suggested_encounter: Option<Encounter>,
}

/// Does `key` match `text` as a case-insensitive whole word?
///
/// A key that fails to compile as part of a word-boundary pattern falls
/// back to plain case-insensitive substring containment.
fn key_matches(key: &str, text: &str) -> bool {
    let pattern = format!(r"\b{}\b", key);
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => regex.is_match(text),
        Err(_) => text.to_lowercase().contains(&key.to_lowercase()),
    }
}

/// Compute triggered world info and the encounter pool for this turn.
///
/// `director_suggestion` is honored when it names an available encounter;
/// otherwise the highest-priority untried encounter is suggested.
pub fn resolve(
    package: &StoryPackage,
    state: &PlotState,
    player_query: &str,
    director_suggestion: Option<&EncounterId>,
) -> ResolvedContext {
    let beat_description = package
        .find_location(&state.current_location)
        .and_then(|(_, loc)| loc.beat(state.current_beat))
        .unwrap_or_default();
    let haystack = format!("{player_query} {beat_description}");

    let world_info = package
        .world_info
        .iter()
        .filter(|entry| entry.keys.iter().any(|key| key_matches(key, &haystack)))
        .cloned()
        .collect();

    let mut available_encounters: Vec<Encounter> = package
        .find_location(&state.current_location)
        .map(|(_, loc)| {
            loc.encounters
                .iter()
                .filter(|e| !state.exhausted_encounters.contains(&e.id))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if let Some(injected) = state.injected_encounters.get(&state.current_location) {
        available_encounters.extend(
            injected
                .iter()
                .filter(|e| !state.exhausted_encounters.contains(&e.id))
                .cloned(),
        );
    }

    let suggested_encounter = director_suggestion
        .and_then(|id| available_encounters.iter().find(|e| &e.id == id))
        .or_else(|| available_encounters.iter().max_by_key(|e| e.priority))
        .cloned();

    ResolvedContext {
        world_info,
        available_encounters,
        suggested_encounter,
    }
}
