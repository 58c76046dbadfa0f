//! Per-session player stats and inventory, mutated by the storyteller's
//! `mutate_player_stats` tool. Skill-check modifiers read from here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub session_id: SessionId,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

impl PlayerState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            stats: BTreeMap::new(),
            inventory: Vec::new(),
        }
    }

    /// Modifier for a skill check; unknown stats contribute 0.
    pub fn stat_modifier(&self, stat: &str) -> i64 {
        self.stats.get(stat).copied().unwrap_or(0)
    }

    pub fn set_stat(&mut self, name: impl Into<String>, value: i64) {
        self.stats.insert(name.into(), value);
    }

    /// Apply a delta to a stat, creating it at the delta if absent.
    pub fn adjust_stat(&mut self, name: impl Into<String>, delta: i64) -> i64 {
        let entry = self.stats.entry(name.into()).or_insert(0);
        *entry += delta;
        *entry
    }

    pub fn add_item(&mut self, item: InventoryItem) {
        self.inventory.push(item);
    }

    /// Remove the first item with the given id. Returns it if found.
    pub fn remove_item(&mut self, id: &ItemId) -> Option<InventoryItem> {
        let index = self.inventory.iter().position(|i| &i.id == id)?;
        Some(self.inventory.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_stat_creates_and_accumulates() {
        let mut state = PlayerState::new(SessionId::new());
        assert_eq!(state.adjust_stat("grit", 2), 2);
        assert_eq!(state.adjust_stat("grit", -1), 1);
        assert_eq!(state.stat_modifier("grit"), 1);
        assert_eq!(state.stat_modifier("unknown"), 0);
    }

    #[test]
    fn remove_item_by_id() {
        let mut state = PlayerState::new(SessionId::new());
        state.add_item(InventoryItem {
            id: ItemId::new("lantern"),
            name: "Storm Lantern".to_string(),
            description: None,
        });

        let removed = state.remove_item(&ItemId::new("lantern"));
        assert!(removed.is_some());
        assert!(state.inventory.is_empty());
        assert!(state.remove_item(&ItemId::new("lantern")).is_none());
    }
}
