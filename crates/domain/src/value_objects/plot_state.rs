//! Durable per-session narrative position and progression counters.
//!
//! PlotState is the single persisted aggregate the turn pipeline reads and
//! writes. It is stored as a versioned JSON record (see
//! [`encode_plot_state`] / [`decode_plot_state`]) so forward-compatibility
//! handling lives in one place instead of at every call site.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{CharacterSeed, Encounter, StoryPackage};
use crate::error::DomainError;
use crate::ids::{ActId, CharacterId, EncounterId, LocationId, PackageId, SessionId};

/// Current persisted record version.
pub const PLOT_STATE_SCHEMA_VERSION: u16 = 1;

/// Opposing-force ticks at which an escalation is recorded.
pub const ESCALATION_THRESHOLDS: [i32; 4] = [3, 6, 9, 12];

/// Typed flag value: the flags map is player-visible game state, so the
/// three shapes the storyteller can record are modeled explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(i64),
    Text(String),
}

/// The antagonist-pressure counter ("doom clock").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpposingForce {
    pub current_tick: i32,
    /// Thresholds crossed so far, in ascending order, each recorded once.
    pub escalation_history: Vec<i32>,
}

impl OpposingForce {
    /// Advance the clock and record any newly crossed thresholds.
    /// Returns the thresholds crossed by this advance.
    pub fn advance(&mut self, ticks: i32) -> Vec<i32> {
        self.current_tick += ticks;
        let mut crossed = Vec::new();
        for threshold in ESCALATION_THRESHOLDS {
            if self.current_tick >= threshold && !self.escalation_history.contains(&threshold) {
                self.escalation_history.push(threshold);
                crossed.push(threshold);
            }
        }
        crossed
    }
}

/// A temporary pressure condition with an expiry measured in turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveComplication {
    pub description: String,
    pub max_turns: u32,
    pub injected_at_turn: u64,
}

impl ActiveComplication {
    pub fn is_expired(&self, turn_count: u64) -> bool {
        turn_count.saturating_sub(self.injected_at_turn) >= u64::from(self.max_turns)
    }
}

/// Where a story character currently is and how they feel about the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub location: Option<LocationId>,
    pub disposition: String,
}

impl From<&CharacterSeed> for CharacterState {
    fn from(seed: &CharacterSeed) -> Self {
        Self {
            location: seed.default_location.clone(),
            disposition: seed.default_disposition.clone(),
        }
    }
}

/// A dice roll the client owes us an answer for.
///
/// Set when a dice-roll frame halts a turn; consumed when the next player
/// input leads with a `[dice-result] N` token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCheck {
    /// Stat whose modifier applies to the roll.
    pub stat: String,
    pub modifier: i64,
}

/// Durable per-session narrative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotState {
    pub session_id: SessionId,
    pub package_id: PackageId,
    pub current_act: ActId,
    pub current_location: LocationId,
    pub current_beat: u32,
    pub off_path_turns: u32,
    /// Incremented once per completed player turn.
    pub turn_count: u64,
    /// Monotonic non-decreasing except via the explicit reset operation.
    pub global_progression: u32,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub opposing_force: OpposingForce,
    #[serde(default)]
    pub character_states: BTreeMap<CharacterId, CharacterState>,
    #[serde(default)]
    pub active_complication: Option<ActiveComplication>,
    /// Grows monotonically within a session.
    #[serde(default)]
    pub exhausted_encounters: BTreeSet<EncounterId>,
    /// Ad-hoc encounters added at runtime, unioned into the location pool
    /// at read time rather than merged into the static graph.
    #[serde(default)]
    pub injected_encounters: BTreeMap<LocationId, Vec<Encounter>>,
    /// Opaque scratchpad owned exclusively by the Director.
    #[serde(default)]
    pub director_notes: serde_json::Value,
    /// Rolling summary of compressed conversation history.
    #[serde(default)]
    pub story_summary: String,
    #[serde(default)]
    pub pending_check: Option<PendingCheck>,
    pub updated_at: DateTime<Utc>,
}

impl PlotState {
    /// Seed fresh state from the package's first act and first location.
    pub fn seed(
        session_id: SessionId,
        package: &StoryPackage,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let act = package
            .first_act()
            .ok_or_else(|| DomainError::validation("story package has no acts"))?;
        let location = act
            .locations
            .first()
            .ok_or_else(|| DomainError::validation("first act has no locations"))?;

        let character_states = package
            .characters
            .iter()
            .map(|seed| (seed.id.clone(), CharacterState::from(seed)))
            .collect();

        Ok(Self {
            session_id,
            package_id: package.id.clone(),
            current_act: act.id.clone(),
            current_location: location.id.clone(),
            current_beat: 0,
            off_path_turns: 0,
            turn_count: 0,
            global_progression: 0,
            flags: BTreeMap::new(),
            opposing_force: OpposingForce::default(),
            character_states,
            active_complication: None,
            exhausted_encounters: BTreeSet::new(),
            injected_encounters: BTreeMap::new(),
            director_notes: serde_json::Value::Null,
            story_summary: String::new(),
            pending_check: None,
            updated_at: now,
        })
    }

    /// Move to a new location. Resets beat position and the off-path
    /// counter; this is the only path that zeroes `off_path_turns`.
    pub fn arrive_at(&mut self, act: ActId, location: LocationId) {
        self.current_act = act;
        self.current_location = location;
        self.current_beat = 0;
        self.off_path_turns = 0;
    }

    /// Drop the active complication if it has run out of turns.
    /// Returns the expired complication, if any.
    pub fn expire_complication(&mut self) -> Option<ActiveComplication> {
        match &self.active_complication {
            Some(c) if c.is_expired(self.turn_count) => self.active_complication.take(),
            _ => None,
        }
    }

    pub fn exhaust_encounter(&mut self, id: EncounterId) {
        self.exhausted_encounters.insert(id);
    }

    pub fn inject_encounter(&mut self, location: LocationId, encounter: Encounter) {
        self.injected_encounters
            .entry(location)
            .or_default()
            .push(encounter);
    }

    pub fn record_flag(&mut self, name: impl Into<String>, value: FlagValue) {
        self.flags.insert(name.into(), value);
    }
}

/// Versioned persistence envelope for [`PlotState`].
#[derive(Debug, Serialize, Deserialize)]
struct PlotStateRecord {
    schema_version: u16,
    #[serde(flatten)]
    state: PlotState,
}

/// Encode plot state as a versioned JSON record.
pub fn encode_plot_state(state: &PlotState) -> Result<String, DomainError> {
    let record = PlotStateRecord {
        schema_version: PLOT_STATE_SCHEMA_VERSION,
        state: state.clone(),
    };
    serde_json::to_string(&record).map_err(|e| DomainError::parse(e.to_string()))
}

/// Decode a versioned JSON record into plot state.
pub fn decode_plot_state(raw: &str) -> Result<PlotState, DomainError> {
    let record: PlotStateRecord =
        serde_json::from_str(raw).map_err(|e| DomainError::parse(e.to_string()))?;
    if record.schema_version > PLOT_STATE_SCHEMA_VERSION {
        return Err(DomainError::parse(format!(
            "unsupported plot state schema version {}",
            record.schema_version
        )));
    }
    Ok(record.state)
}
