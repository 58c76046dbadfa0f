//! Storyloom domain model.
//!
//! Pure data: the authored story graph, per-session plot state, the
//! Director's mutation batch, the combat state machine, the frame
//! contract and skill-check banding. No IO and no async: everything
//! here is exercised by the engine crate through typed ports.

pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use entities::{Act, CharacterSeed, Encounter, Location, StoryPackage, Successor, WorldInfoEntry};
pub use error::DomainError;
pub use ids::{
    ActId, CharacterId, EncounterId, ItemId, LocationId, PackageId, SessionId, TokenId,
};
pub use value_objects::{
    core_frame_guide, decode_plot_state, encode_plot_state, extended_frame_guide,
    extended_kinds_mentioned, format_dice_result, parse_dice_result, ActiveComplication,
    CharacterState, CharacterUpdate, CombatEvent, CombatPhase, CombatResult, CombatState,
    CombatToken, ComplicationChange, DirectionPack, EncounterInjection, FlagValue, Frame,
    FrameKind, GridPosition, InventoryItem, OpposingForce, PendingCheck, PlayerState, PlotState,
    SkillCheckResolution, SkillOutcome, StateMutationBatch, TerrainCell, TerrainKind, TokenKind,
    TokenSpec, YieldKind, DICE_RESULT_PREFIX, ESCALATION_THRESHOLDS, PLOT_STATE_SCHEMA_VERSION,
};
