//! Nested tactical-combat state machine.
//!
//! Combat has its own persistence and its own round/phase progression,
//! entered and driven by the storyteller through typed events. A token's
//! HP reaching zero is logged but never ends combat by itself; the
//! narrative layer decides pacing via the explicit `end_combat` event.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{SessionId, TokenId};

// Stat defaults applied when a token spec omits a value.
const DEFAULT_ATTACK: i32 = 4;
const DEFAULT_DEFENSE: i32 = 10;
const DEFAULT_MOVE_RANGE_PLAYER: i32 = 4;
const DEFAULT_MOVE_RANGE_OTHER: i32 = 3;
const DEFAULT_ATTACK_RANGE: i32 = 1;
const DEFAULT_HP: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Player,
    Enemy,
    Ally,
    Objective,
    Npc,
}

impl TokenKind {
    /// Whether this token acts during the player phase.
    pub fn is_player_side(&self) -> bool {
        matches!(self, TokenKind::Player | TokenKind::Ally)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    Blocked,
    Difficult,
    Hazard,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainCell {
    pub position: GridPosition,
    pub kind: TerrainKind,
}

/// A combatant (or objective) on the tactical grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatToken {
    pub id: TokenId,
    pub name: String,
    pub kind: TokenKind,
    pub position: GridPosition,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub move_range: i32,
    pub attack_range: i32,
    pub has_acted: bool,
    pub has_moved: bool,
    #[serde(default)]
    pub status_effects: Vec<String>,
}

/// Token as supplied at setup or injection; omitted stats take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub id: TokenId,
    pub name: String,
    pub kind: TokenKind,
    pub position: GridPosition,
    #[serde(default)]
    pub hp: Option<i32>,
    #[serde(default)]
    pub max_hp: Option<i32>,
    #[serde(default)]
    pub attack: Option<i32>,
    #[serde(default)]
    pub defense: Option<i32>,
    #[serde(default)]
    pub move_range: Option<i32>,
    #[serde(default)]
    pub attack_range: Option<i32>,
}

impl TokenSpec {
    /// Fill omitted stats with the fixed defaults.
    pub fn into_token(self) -> CombatToken {
        let max_hp = self.max_hp.or(self.hp).unwrap_or(DEFAULT_HP);
        let move_range = self.move_range.unwrap_or(if self.kind == TokenKind::Player {
            DEFAULT_MOVE_RANGE_PLAYER
        } else {
            DEFAULT_MOVE_RANGE_OTHER
        });
        CombatToken {
            id: self.id,
            name: self.name,
            kind: self.kind,
            position: self.position,
            hp: self.hp.unwrap_or(max_hp),
            max_hp,
            attack: self.attack.unwrap_or(DEFAULT_ATTACK),
            defense: self.defense.unwrap_or(DEFAULT_DEFENSE),
            move_range,
            attack_range: self.attack_range.unwrap_or(DEFAULT_ATTACK_RANGE),
            has_acted: false,
            has_moved: false,
            status_effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    Init,
    PlayerPhase,
    EnemyPhase,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatResult {
    Victory,
    Defeat,
    Escape,
}

/// Typed combat event. Batches are applied atomically, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombatEvent {
    /// Clamp the token's HP into `[0, max_hp]`; logs a defeat line when
    /// the token drops to exactly 0, without ending combat.
    ModifyHp { token: TokenId, delta: i32 },
    MoveToken { token: TokenId, position: GridPosition },
    AddToken { token: TokenSpec },
    RemoveToken { token: TokenId },
    AddTerrain { cell: TerrainCell },
    AddStatusEffect { token: TokenId, effect: String },
    RemoveStatusEffect { token: TokenId, effect: String },
    LogMessage { message: String },
    /// Player phase ⇄ enemy phase; a full cycle increments the round and
    /// clears per-token acted/moved flags.
    AdvancePhase,
    /// The only event that completes combat.
    EndCombat {
        result: CombatResult,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Persistent combat state for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    pub session_id: SessionId,
    pub setting: String,
    pub tokens: Vec<CombatToken>,
    pub terrain: Vec<TerrainCell>,
    pub round: u32,
    pub phase: CombatPhase,
    pub turn_order: Vec<TokenId>,
    pub active_token: Option<TokenId>,
    pub log: Vec<String>,
    pub is_complete: bool,
    pub result: Option<CombatResult>,
}

impl CombatState {
    /// Build the roster and turn order: player-kind tokens first in
    /// listing order, then remaining non-objective tokens.
    pub fn initialize(
        session_id: SessionId,
        setting: impl Into<String>,
        specs: Vec<TokenSpec>,
        terrain: Vec<TerrainCell>,
    ) -> Self {
        let tokens: Vec<CombatToken> = specs.into_iter().map(TokenSpec::into_token).collect();

        let mut turn_order: Vec<TokenId> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Player)
            .map(|t| t.id.clone())
            .collect();
        turn_order.extend(
            tokens
                .iter()
                .filter(|t| t.kind != TokenKind::Player && t.kind != TokenKind::Objective)
                .map(|t| t.id.clone()),
        );

        let active_token = turn_order.first().cloned();

        Self {
            session_id,
            setting: setting.into(),
            tokens,
            terrain,
            round: 1,
            phase: CombatPhase::PlayerPhase,
            turn_order,
            active_token,
            log: Vec::new(),
            is_complete: false,
            result: None,
        }
    }

    pub fn token(&self, id: &TokenId) -> Option<&CombatToken> {
        self.tokens.iter().find(|t| &t.id == id)
    }

    fn token_mut(&mut self, id: &TokenId) -> Result<&mut CombatToken, DomainError> {
        self.tokens
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| DomainError::not_found("CombatToken", id.to_string()))
    }

    /// Apply an ordered batch of events atomically: if any event is
    /// invalid, no event in the batch takes effect.
    pub fn apply_events(&mut self, events: &[CombatEvent]) -> Result<(), DomainError> {
        let mut next = self.clone();
        for event in events {
            next.apply(event)?;
        }
        *self = next;
        Ok(())
    }

    fn apply(&mut self, event: &CombatEvent) -> Result<(), DomainError> {
        if self.is_complete {
            return Err(DomainError::invalid_state_transition(
                "combat is already complete",
            ));
        }

        match event {
            CombatEvent::ModifyHp { token, delta } => {
                let entry = self.token_mut(token)?;
                let was_standing = entry.hp > 0;
                entry.hp = (entry.hp + delta).clamp(0, entry.max_hp);
                if entry.hp == 0 && was_standing {
                    let line = format!("{} is defeated.", entry.name);
                    self.log.push(line);
                }
            }
            CombatEvent::MoveToken { token, position } => {
                let entry = self.token_mut(token)?;
                entry.position = *position;
                entry.has_moved = true;
            }
            CombatEvent::AddToken { token } => {
                if self.token(&token.id).is_some() {
                    return Err(DomainError::constraint(format!(
                        "token '{}' already exists",
                        token.id
                    )));
                }
                let combatant = token.clone().into_token();
                if combatant.kind != TokenKind::Objective {
                    self.turn_order.push(combatant.id.clone());
                }
                self.log.push(format!("{} joins the fight.", combatant.name));
                self.tokens.push(combatant);
            }
            CombatEvent::RemoveToken { token } => {
                let Some(index) = self.tokens.iter().position(|t| &t.id == token) else {
                    return Err(DomainError::not_found("CombatToken", token.to_string()));
                };
                let removed = self.tokens.remove(index);
                self.turn_order.retain(|id| id != token);
                if self.active_token.as_ref() == Some(token) {
                    self.active_token = None;
                }
                self.log.push(format!("{} leaves the field.", removed.name));
            }
            CombatEvent::AddTerrain { cell } => {
                self.terrain.push(*cell);
            }
            CombatEvent::AddStatusEffect { token, effect } => {
                let entry = self.token_mut(token)?;
                if !entry.status_effects.contains(effect) {
                    entry.status_effects.push(effect.clone());
                }
            }
            CombatEvent::RemoveStatusEffect { token, effect } => {
                let entry = self.token_mut(token)?;
                entry.status_effects.retain(|e| e != effect);
            }
            CombatEvent::LogMessage { message } => {
                self.log.push(message.clone());
            }
            CombatEvent::AdvancePhase => self.advance_phase()?,
            CombatEvent::EndCombat { result, message } => {
                self.is_complete = true;
                self.result = Some(*result);
                self.phase = CombatPhase::Complete;
                self.active_token = None;
                let line = message.clone().unwrap_or_else(|| {
                    match result {
                        CombatResult::Victory => "The battle is won.",
                        CombatResult::Defeat => "The battle is lost.",
                        CombatResult::Escape => "The party escapes the battle.",
                    }
                    .to_string()
                });
                self.log.push(line);
            }
        }
        Ok(())
    }

    fn advance_phase(&mut self) -> Result<(), DomainError> {
        self.phase = match self.phase {
            CombatPhase::Init | CombatPhase::EnemyPhase => {
                // Completing the enemy phase closes the round.
                if self.phase == CombatPhase::EnemyPhase {
                    self.round += 1;
                    for token in &mut self.tokens {
                        token.has_acted = false;
                        token.has_moved = false;
                    }
                }
                CombatPhase::PlayerPhase
            }
            CombatPhase::PlayerPhase => CombatPhase::EnemyPhase,
            CombatPhase::Complete => {
                return Err(DomainError::invalid_state_transition(
                    "cannot advance phase after combat is complete",
                ))
            }
        };

        let entering_player_side = self.phase == CombatPhase::PlayerPhase;
        self.active_token = self
            .turn_order
            .iter()
            .find(|id| {
                self.tokens
                    .iter()
                    .any(|t| &&t.id == id && t.kind.is_player_side() == entering_player_side && t.hp > 0)
            })
            .cloned();
        Ok(())
    }
}
