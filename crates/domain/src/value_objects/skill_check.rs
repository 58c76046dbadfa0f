//! Skill-check banding and the dice-result handshake.
//!
//! The server never rolls dice. A dice-roll frame halts the turn, the
//! client performs the roll, and the next player input leads with a
//! synthetic `[dice-result] N` token. The banding below is fixed and must
//! not be softened.

use serde::{Deserialize, Serialize};

/// Leading token carried by the input that answers a dice-roll frame.
pub const DICE_RESULT_PREFIX: &str = "[dice-result]";

/// Fixed outcome bands over `roll + modifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillOutcome {
    /// Total ≥ 10.
    FullSuccess,
    /// Total 7-9: succeeds with an explicit cost.
    MixedSuccess,
    /// Total ≤ 6.
    Miss,
}

impl SkillOutcome {
    pub fn from_total(total: i64) -> Self {
        if total >= 10 {
            SkillOutcome::FullSuccess
        } else if total >= 7 {
            SkillOutcome::MixedSuccess
        } else {
            SkillOutcome::Miss
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillOutcome::FullSuccess => "full_success",
            SkillOutcome::MixedSuccess => "mixed_success",
            SkillOutcome::Miss => "miss",
        }
    }

    /// How the storyteller should narrate this band.
    pub fn narration_hint(&self) -> &'static str {
        match self {
            SkillOutcome::FullSuccess => "the attempt succeeds cleanly",
            SkillOutcome::MixedSuccess => {
                "the attempt succeeds, but with an explicit cost or complication"
            }
            SkillOutcome::Miss => "the attempt fails and the situation worsens",
        }
    }
}

/// A banded skill-check result ready for the skill-check frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCheckResolution {
    pub stat: String,
    pub roll: i64,
    pub modifier: i64,
    pub total: i64,
    pub outcome: SkillOutcome,
}

impl SkillCheckResolution {
    pub fn resolve(stat: impl Into<String>, roll: i64, modifier: i64) -> Self {
        let total = roll + modifier;
        Self {
            stat: stat.into(),
            roll,
            modifier,
            total,
            outcome: SkillOutcome::from_total(total),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} check: rolled {} + {} = {} ({}; {})",
            self.stat,
            self.roll,
            self.modifier,
            self.total,
            self.outcome.as_str(),
            self.outcome.narration_hint()
        )
    }
}

/// Format the synthetic token injected ahead of the next player input.
pub fn format_dice_result(roll: i64) -> String {
    format!("{DICE_RESULT_PREFIX} {roll}")
}

/// Parse a leading `[dice-result] N` token. Returns the roll and the rest
/// of the input with the token stripped.
pub fn parse_dice_result(input: &str) -> Option<(i64, &str)> {
    let trimmed = input.trim_start();
    let rest = trimmed.strip_prefix(DICE_RESULT_PREFIX)?;
    let rest = rest.trim_start();
    let digits_end = rest
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && c == '-'))
        .count();
    if digits_end == 0 {
        return None;
    }
    let (number, remainder) = rest.split_at(
        rest.char_indices()
            .nth(digits_end)
            .map(|(i, _)| i)
            .unwrap_or(rest.len()),
    );
    let roll = number.parse::<i64>().ok()?;
    Some((roll, remainder.trim_start()))
}
