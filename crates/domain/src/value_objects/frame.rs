//! The frame contract: renderable narrative instructions emitted by the
//! storyteller's tool loop, and the yield vocabulary that closes a turn.
//!
//! Each frame kind declares a required payload field and whether it lives
//! in the always-available "core" prompt section or the on-demand
//! "extended" guide.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Render variant vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    FullScreen,
    Dialogue,
    ThreePanel,
    Choice,
    Battle,
    Transition,
    DiceRoll,
    SkillCheck,
    Inventory,
    Map,
    TacticalMap,
    CharacterSheet,
    ItemPresentation,
    CgPresentation,
    Monologue,
    Investigation,
    LoreUnlock,
    DynamicCutIn,
    Flashback,
    CrossExamination,
    TimeLimit,
}

impl FrameKind {
    pub const ALL: [FrameKind; 21] = [
        FrameKind::FullScreen,
        FrameKind::Dialogue,
        FrameKind::ThreePanel,
        FrameKind::Choice,
        FrameKind::Battle,
        FrameKind::Transition,
        FrameKind::DiceRoll,
        FrameKind::SkillCheck,
        FrameKind::Inventory,
        FrameKind::Map,
        FrameKind::TacticalMap,
        FrameKind::CharacterSheet,
        FrameKind::ItemPresentation,
        FrameKind::CgPresentation,
        FrameKind::Monologue,
        FrameKind::Investigation,
        FrameKind::LoreUnlock,
        FrameKind::DynamicCutIn,
        FrameKind::Flashback,
        FrameKind::CrossExamination,
        FrameKind::TimeLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::FullScreen => "full-screen",
            FrameKind::Dialogue => "dialogue",
            FrameKind::ThreePanel => "three-panel",
            FrameKind::Choice => "choice",
            FrameKind::Battle => "battle",
            FrameKind::Transition => "transition",
            FrameKind::DiceRoll => "dice-roll",
            FrameKind::SkillCheck => "skill-check",
            FrameKind::Inventory => "inventory",
            FrameKind::Map => "map",
            FrameKind::TacticalMap => "tactical-map",
            FrameKind::CharacterSheet => "character-sheet",
            FrameKind::ItemPresentation => "item-presentation",
            FrameKind::CgPresentation => "cg-presentation",
            FrameKind::Monologue => "monologue",
            FrameKind::Investigation => "investigation",
            FrameKind::LoreUnlock => "lore-unlock",
            FrameKind::DynamicCutIn => "dynamic-cut-in",
            FrameKind::Flashback => "flashback",
            FrameKind::CrossExamination => "cross-examination",
            FrameKind::TimeLimit => "time-limit",
        }
    }

    /// The payload field that must be present for this variant.
    pub fn required_field(&self) -> &'static str {
        match self {
            FrameKind::FullScreen => "text",
            FrameKind::Dialogue => "speaker",
            FrameKind::ThreePanel => "panels",
            FrameKind::Choice => "options",
            FrameKind::Battle => "encounter",
            FrameKind::Transition => "caption",
            FrameKind::DiceRoll => "formula",
            FrameKind::SkillCheck => "outcome",
            FrameKind::Inventory => "items",
            FrameKind::Map => "locations",
            FrameKind::TacticalMap => "combat",
            FrameKind::CharacterSheet => "stats",
            FrameKind::ItemPresentation => "item",
            FrameKind::CgPresentation => "image_prompt",
            FrameKind::Monologue => "text",
            FrameKind::Investigation => "hotspots",
            FrameKind::LoreUnlock => "entry",
            FrameKind::DynamicCutIn => "text",
            FrameKind::Flashback => "text",
            FrameKind::CrossExamination => "statements",
            FrameKind::TimeLimit => "seconds",
        }
    }

    /// Core variants are described in every storyteller prompt; extended
    /// variants only when the Director's brief calls for one.
    pub fn is_core(&self) -> bool {
        matches!(
            self,
            FrameKind::FullScreen
                | FrameKind::Dialogue
                | FrameKind::ThreePanel
                | FrameKind::Choice
                | FrameKind::Transition
                | FrameKind::DiceRoll
                | FrameKind::SkillCheck
                | FrameKind::Monologue
        )
    }

    fn guide_line(&self) -> String {
        let usage = match self {
            FrameKind::FullScreen => "narration over a full-screen backdrop",
            FrameKind::Dialogue => "a character speaking; include portrait and emotion hints",
            FrameKind::ThreePanel => "three side-by-side story panels",
            FrameKind::Choice => "present 2-4 options for the player to pick from",
            FrameKind::Battle => "announce a tactical encounter beginning",
            FrameKind::Transition => "a scene or time transition card",
            FrameKind::DiceRoll => "ask the client to roll dice; always ends the turn",
            FrameKind::SkillCheck => "report a banded skill-check outcome",
            FrameKind::Inventory => "show the player's current items",
            FrameKind::Map => "show known locations and connections",
            FrameKind::TacticalMap => "render the combat grid state",
            FrameKind::CharacterSheet => "show the player's stats",
            FrameKind::ItemPresentation => "present a single significant item",
            FrameKind::CgPresentation => "a full-art illustrated moment",
            FrameKind::Monologue => "interior monologue from the player character",
            FrameKind::Investigation => "an explorable scene with clickable hotspots",
            FrameKind::LoreUnlock => "announce newly unlocked world lore",
            FrameKind::DynamicCutIn => "a sharp dramatic cut-in line",
            FrameKind::Flashback => "a scene set in the past",
            FrameKind::CrossExamination => "press and challenge a series of statements",
            FrameKind::TimeLimit => "start a countdown the player acts under",
        };
        format!(
            "- \"{}\" (requires \"{}\"): {}",
            self.as_str(),
            self.required_field(),
            usage
        )
    }
}

/// One renderable narrative instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: serde_json::Value,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }

    /// Check the payload is an object carrying the variant's required field.
    pub fn validate(&self) -> Result<(), DomainError> {
        let Some(object) = self.payload.as_object() else {
            return Err(DomainError::validation(format!(
                "frame '{}' payload must be a JSON object",
                self.kind.as_str()
            )));
        };
        let required = self.kind.required_field();
        if !object.contains_key(required) {
            return Err(DomainError::validation(format!(
                "frame '{}' payload is missing required field '{}'",
                self.kind.as_str(),
                required
            )));
        }
        Ok(())
    }
}

/// Guide text for the core variants, included in every storyteller prompt.
pub fn core_frame_guide() -> String {
    let mut lines = vec!["Core frame kinds:".to_string()];
    lines.extend(FrameKind::ALL.iter().filter(|k| k.is_core()).map(|k| k.guide_line()));
    lines.join("\n")
}

/// Guide text for the extended variants, served on demand.
pub fn extended_frame_guide() -> String {
    let mut lines = vec!["Extended frame kinds:".to_string()];
    lines.extend(
        FrameKind::ALL
            .iter()
            .filter(|k| !k.is_core())
            .map(|k| k.guide_line()),
    );
    lines.join("\n")
}

/// Extended kinds whose kebab-case name appears in the given text.
/// Used to pull the extended guide into the prompt only when the
/// Director's brief asks for an unusual presentation.
pub fn extended_kinds_mentioned(text: &str) -> Vec<FrameKind> {
    let lowered = text.to_lowercase();
    FrameKind::ALL
        .iter()
        .filter(|k| !k.is_core() && lowered.contains(k.as_str()))
        .copied()
        .collect()
}

/// What kind of player input the turn expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YieldKind {
    Choice,
    FreeText,
    Continue,
    DiceResult,
    CombatResult,
}

impl YieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            YieldKind::Choice => "choice",
            YieldKind::FreeText => "free-text",
            YieldKind::Continue => "continue",
            YieldKind::DiceResult => "dice-result",
            YieldKind::CombatResult => "combat-result",
        }
    }
}

impl std::str::FromStr for YieldKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "choice" => Ok(YieldKind::Choice),
            "free-text" => Ok(YieldKind::FreeText),
            "continue" => Ok(YieldKind::Continue),
            "dice-result" => Ok(YieldKind::DiceResult),
            "combat-result" => Ok(YieldKind::CombatResult),
            other => Err(DomainError::parse(format!("unknown yield kind: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_names_are_kebab_case() {
        let json = serde_json::to_string(&FrameKind::TacticalMap).expect("serialize");
        assert_eq!(json, "\"tactical-map\"");
        let kind: FrameKind = serde_json::from_str("\"cross-examination\"").expect("parse");
        assert_eq!(kind, FrameKind::CrossExamination);
    }

    #[test]
    fn validate_requires_declared_field() {
        let ok = Frame::new(FrameKind::Choice, json!({"options": ["stay", "run"]}));
        assert!(ok.validate().is_ok());

        let missing = Frame::new(FrameKind::Choice, json!({"text": "pick one"}));
        assert!(missing.validate().is_err());

        let not_object = Frame::new(FrameKind::Dialogue, json!("hello"));
        assert!(not_object.validate().is_err());
    }

    #[test]
    fn every_kind_has_a_guide_entry() {
        let all = format!("{}\n{}", core_frame_guide(), extended_frame_guide());
        for kind in FrameKind::ALL {
            assert!(all.contains(kind.as_str()), "missing {}", kind.as_str());
        }
    }

    #[test]
    fn extended_mention_detection() {
        let mentioned =
            extended_kinds_mentioned("Stage this as a flashback, then a cross-examination.");
        assert_eq!(
            mentioned,
            vec![FrameKind::Flashback, FrameKind::CrossExamination]
        );
        // Core kinds never trigger the extended guide
        assert!(extended_kinds_mentioned("use dialogue frames").is_empty());
    }
}
