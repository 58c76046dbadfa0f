mod combat;
mod frame;
mod mutation;
mod player_state;
mod plot_state;
mod skill_check;

pub use combat::{
    CombatEvent, CombatPhase, CombatResult, CombatState, CombatToken, GridPosition, TerrainCell,
    TerrainKind, TokenKind, TokenSpec,
};
pub use frame::{
    core_frame_guide, extended_frame_guide, extended_kinds_mentioned, Frame, FrameKind, YieldKind,
};
pub use mutation::{
    CharacterUpdate, ComplicationChange, DirectionPack, EncounterInjection, StateMutationBatch,
};
pub use player_state::{InventoryItem, PlayerState};
pub use plot_state::{
    decode_plot_state, encode_plot_state, ActiveComplication, CharacterState, FlagValue,
    OpposingForce, PendingCheck, PlotState, ESCALATION_THRESHOLDS, PLOT_STATE_SCHEMA_VERSION,
};
pub use skill_check::{
    format_dice_result, parse_dice_result, SkillCheckResolution, SkillOutcome, DICE_RESULT_PREFIX,
};
