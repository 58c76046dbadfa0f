//! The Director's per-turn output: a narrative brief plus a typed batch of
//! state mutations. Ephemeral: produced once per turn, consumed by that
//! same turn's storyteller prompt assembly, never persisted.

use serde::{Deserialize, Serialize};

use crate::entities::Encounter;
use crate::ids::{CharacterId, EncounterId, LocationId};

/// Policy-level output of the Director, consumed by the Storyteller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionPack {
    /// Free-form instruction brief for the storyteller.
    pub brief: String,
    #[serde(default)]
    pub mutations: StateMutationBatch,
    #[serde(default)]
    pub suggested_encounter: Option<EncounterId>,
}

impl DirectionPack {
    /// Neutral pack used whenever the Director's response cannot be
    /// decoded. A malformed model response must never fail a turn.
    pub fn fallback() -> Self {
        Self {
            brief: "Continue the scene naturally from the player's action. \
                    Stay close to the current beat and keep the pacing steady."
                .to_string(),
            mutations: StateMutationBatch::default(),
            suggested_encounter: None,
        }
    }
}

/// Typed batch of plot-state mutations applied before the storyteller runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMutationBatch {
    /// Progression is monotonic: negative deltas are clamped on apply.
    pub progression_delta: i32,
    /// Opposing-force ("doom clock") tick delta.
    pub force_ticks: i32,
    /// Advance within the current location's beat list.
    pub beat_delta: i32,
    /// The Director judged this turn to be off the scripted path.
    pub off_path: bool,
    pub character_updates: Vec<CharacterUpdate>,
    pub complication: Option<ComplicationChange>,
    pub exhaust_encounters: Vec<EncounterId>,
    pub inject_encounters: Vec<EncounterInjection>,
    /// Replacement scratchpad carried to the next turn's Director call.
    pub notes: Option<serde_json::Value>,
}

impl StateMutationBatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Per-character placement / disposition update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterUpdate {
    pub character: CharacterId,
    #[serde(default)]
    pub location: Option<LocationId>,
    #[serde(default)]
    pub disposition: Option<String>,
}

/// Set or clear the active complication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ComplicationChange {
    Set { description: String, max_turns: u32 },
    Clear,
}

/// An ad-hoc encounter added to a location's pool at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterInjection {
    pub location: LocationId,
    pub encounter: Encounter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_pack_has_empty_mutations() {
        let pack = DirectionPack::fallback();
        assert!(pack.mutations.is_empty());
        assert!(pack.suggested_encounter.is_none());
        assert!(!pack.brief.is_empty());
    }

    #[test]
    fn partial_json_parses_with_defaults() {
        let pack: DirectionPack =
            serde_json::from_str(r#"{"brief": "Raise the tension."}"#).expect("parse");
        assert_eq!(pack.brief, "Raise the tension.");
        assert!(pack.mutations.is_empty());
    }

    #[test]
    fn complication_change_tags_roundtrip() {
        let set = ComplicationChange::Set {
            description: "Guards are searching the docks".to_string(),
            max_turns: 3,
        };
        let json = serde_json::to_string(&set).expect("serialize");
        assert!(json.contains(r#""op":"set""#));
        let back: ComplicationChange = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, set);
    }
}
