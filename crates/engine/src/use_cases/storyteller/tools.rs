//! Tool definitions for the storyteller's fixed vocabulary.
//!
//! Converts the turn executor's tools to LLM ToolDefinition format for
//! function calling. The loop terminates when `yield_to_player` is
//! invoked; a dice-roll frame also halts it.

use serde_json::json;

use crate::infrastructure::ports::ToolDefinition;

/// Build the storyteller tool vocabulary for LLM function calling.
pub fn build_storyteller_tools() -> Vec<ToolDefinition> {
    vec![
        build_read_plot_state_tool(),
        build_build_frame_tool(),
        build_mutate_player_stats_tool(),
        build_record_flag_tool(),
        build_travel_tool(),
        build_complete_encounter_tool(),
        build_initialize_combat_tool(),
        build_inject_combat_event_tool(),
        build_yield_to_player_tool(),
    ]
}

fn build_read_plot_state_tool() -> ToolDefinition {
    ToolDefinition {
        name: "read_plot_state".to_string(),
        description: "Read the current narrative position: location, act, beat, triggered lore, \
                      active flags, reachable locations and pending events."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "player_query": {
                    "type": "string",
                    "description": "Text to match against world-info keywords (usually the player's action)"
                }
            },
            "required": []
        }),
    }
}

fn build_build_frame_tool() -> ToolDefinition {
    ToolDefinition {
        name: "build_frame".to_string(),
        description: "Emit one renderable frame to the player. A dice-roll frame ends the turn; \
                      the client rolls and answers with a [dice-result] token."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "description": "Frame kind in kebab-case, e.g. \"dialogue\", \"choice\", \"dice-roll\""
                },
                "payload": {
                    "type": "object",
                    "description": "Frame payload; each kind declares one required field"
                }
            },
            "required": ["kind", "payload"]
        }),
    }
}

fn build_mutate_player_stats_tool() -> ToolDefinition {
    ToolDefinition {
        name: "mutate_player_stats".to_string(),
        description: "Change the player's stats or inventory. Use for damage, healing, resource \
                      spending, and items gained or lost."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["set_stat", "adjust_stat", "add_item", "remove_item"],
                    "description": "Which mutation to perform"
                },
                "stat_name": {
                    "type": "string",
                    "description": "Stat to set or adjust (for set_stat / adjust_stat)"
                },
                "value": {
                    "type": "integer",
                    "description": "New value (set_stat) or delta (adjust_stat)"
                },
                "updates": {
                    "type": "object",
                    "description": "Bulk form: map of stat name to value/delta, instead of stat_name + value"
                },
                "item": {
                    "type": "object",
                    "description": "Item to add (for add_item): {id, name, description?}"
                },
                "item_id": {
                    "type": "string",
                    "description": "Item to remove (for remove_item)"
                }
            },
            "required": ["action"]
        }),
    }
}

fn build_record_flag_tool() -> ToolDefinition {
    ToolDefinition {
        name: "record_flag".to_string(),
        description: "Record a named story flag. Use when the player learns, decides or changes \
                      something the story must remember."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "flag_name": {
                    "type": "string",
                    "description": "Flag name, snake_case"
                },
                "value": {
                    "description": "Boolean, number or string value",
                    "type": ["boolean", "integer", "string"]
                }
            },
            "required": ["flag_name", "value"]
        }),
    }
}

fn build_travel_tool() -> ToolDefinition {
    ToolDefinition {
        name: "travel".to_string(),
        description: "Move the player to a connected location. Fails with the list of valid \
                      options if the target is not reachable from here."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "target_location_id": {
                    "type": "string",
                    "description": "The destination location id"
                }
            },
            "required": ["target_location_id"]
        }),
    }
}

fn build_complete_encounter_tool() -> ToolDefinition {
    ToolDefinition {
        name: "complete_encounter".to_string(),
        description: "Mark an encounter as resolved so it never re-triggers. Set \
                      advance_location when it was the location's final scripted encounter."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "encounter_id": {
                    "type": "string",
                    "description": "The encounter being resolved"
                },
                "advance_location": {
                    "type": "boolean",
                    "description": "Also complete the current location and advance the story"
                }
            },
            "required": ["encounter_id"]
        }),
    }
}

fn build_initialize_combat_tool() -> ToolDefinition {
    ToolDefinition {
        name: "initialize_combat".to_string(),
        description: "Start a tactical encounter: build the token roster and turn order. \
                      Returns frame data for a tactical-map frame."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "setting": {
                    "type": "string",
                    "description": "One-line description of the battlefield"
                },
                "tokens": {
                    "type": "array",
                    "description": "Combatants: {id, name, kind, position:{x,y}, hp?, attack?, defense?, move_range?, attack_range?}",
                    "items": {"type": "object"}
                },
                "terrain": {
                    "type": "array",
                    "description": "Terrain cells: {position:{x,y}, kind: blocked|difficult|hazard|cover}",
                    "items": {"type": "object"}
                }
            },
            "required": ["setting", "tokens"]
        }),
    }
}

fn build_inject_combat_event_tool() -> ToolDefinition {
    ToolDefinition {
        name: "inject_combat_event".to_string(),
        description: "Apply an ordered batch of combat events atomically: modify_hp, move_token, \
                      add_token, remove_token, add_terrain, add_status_effect, \
                      remove_status_effect, log_message, advance_phase, end_combat. Only \
                      end_combat finishes the battle; 0 HP alone never does."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "events": {
                    "type": "array",
                    "description": "Events with a \"type\" tag, applied in order",
                    "items": {"type": "object"}
                }
            },
            "required": ["events"]
        }),
    }
}

fn build_yield_to_player_tool() -> ToolDefinition {
    ToolDefinition {
        name: "yield_to_player".to_string(),
        description: "End the turn and hand control to the player. Always finish every turn \
                      with this tool."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "waiting_for": {
                    "type": "string",
                    "enum": ["choice", "free-text", "continue", "dice-result", "combat-result"],
                    "description": "What kind of player input comes next"
                }
            },
            "required": ["waiting_for"]
        }),
    }
}
