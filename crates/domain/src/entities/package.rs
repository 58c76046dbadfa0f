//! Static story package graph.
//!
//! A package is authored content: acts containing locations, locations
//! containing beats, encounters and connections to other locations. The
//! graph is read-only at runtime; per-session position lives in
//! [`crate::value_objects::PlotState`].

use serde::{Deserialize, Serialize};

use crate::ids::{ActId, CharacterId, EncounterId, LocationId, PackageId};

/// A complete authored story package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryPackage {
    pub id: PackageId,
    pub title: String,
    /// One-paragraph premise handed to both model roles every turn.
    pub premise: String,
    pub acts: Vec<Act>,
    #[serde(default)]
    pub world_info: Vec<WorldInfoEntry>,
    #[serde(default)]
    pub characters: Vec<CharacterSeed>,
}

/// An act groups locations into a chapter of the story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Act {
    pub id: ActId,
    pub title: String,
    pub locations: Vec<Location>,
}

/// A story location: a scripted scene or a revisitable sandbox node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub description: String,
    /// Ordered narrative beats; `PlotState::current_beat` indexes into this.
    #[serde(default)]
    pub beats: Vec<String>,
    /// Locations reachable via sandbox travel.
    #[serde(default)]
    pub connections: Vec<LocationId>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    /// Sandbox locations are revisitable and never auto-advance.
    #[serde(default)]
    pub sandbox: bool,
}

impl Location {
    /// The beat description at the given index, if any.
    pub fn beat(&self, index: u32) -> Option<&str> {
        self.beats.get(index as usize).map(String::as_str)
    }
}

/// A location-scoped narrative unit, exhausted once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub title: String,
    pub description: String,
    /// Higher runs first when the Director has no explicit suggestion.
    #[serde(default)]
    pub priority: u8,
}

/// A lore entry triggered by keyword matching against player text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldInfoEntry {
    /// Match keys; each is tried as a case-insensitive whole-word pattern.
    pub keys: Vec<String>,
    pub content: String,
}

/// Initial placement and disposition for a story character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSeed {
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub default_location: Option<LocationId>,
    #[serde(default = "default_disposition")]
    pub default_disposition: String,
}

fn default_disposition() -> String {
    "neutral".to_string()
}

/// Where the story goes after a location is completed.
#[derive(Debug, Clone, PartialEq)]
pub enum Successor {
    /// Advance to a later location, possibly in the next act.
    Next { act: ActId, location: LocationId },
    /// The completed location was the last one in the package.
    StoryComplete,
}

impl StoryPackage {
    pub fn first_act(&self) -> Option<&Act> {
        self.acts.first()
    }

    /// Find a location anywhere in the package, along with its act.
    pub fn find_location(&self, id: &LocationId) -> Option<(&Act, &Location)> {
        self.acts.iter().find_map(|act| {
            act.locations
                .iter()
                .find(|loc| &loc.id == id)
                .map(|loc| (act, loc))
        })
    }

    pub fn find_character(&self, id: &CharacterId) -> Option<&CharacterSeed> {
        self.characters.iter().find(|c| &c.id == id)
    }

    /// Resolve the successor of a completed location: a later location in
    /// the same act, else the first location of the next act, else the
    /// story is complete.
    pub fn successor_of(&self, completed: &LocationId) -> Option<Successor> {
        for (act_idx, act) in self.acts.iter().enumerate() {
            let Some(loc_idx) = act.locations.iter().position(|l| &l.id == completed) else {
                continue;
            };

            if let Some(next) = act.locations.get(loc_idx + 1) {
                return Some(Successor::Next {
                    act: act.id.clone(),
                    location: next.id.clone(),
                });
            }

            for later_act in &self.acts[act_idx + 1..] {
                if let Some(first) = later_act.locations.first() {
                    return Some(Successor::Next {
                        act: later_act.id.clone(),
                        location: first.id.clone(),
                    });
                }
            }

            return Some(Successor::StoryComplete);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_act_package() -> StoryPackage {
        StoryPackage {
            id: PackageId::new("test-package"),
            title: "Test".to_string(),
            premise: "A test story".to_string(),
            acts: vec![
                Act {
                    id: ActId::new("act-1"),
                    title: "Act One".to_string(),
                    locations: vec![
                        Location {
                            id: LocationId::new("docks"),
                            name: "The Docks".to_string(),
                            description: "Fog over black water".to_string(),
                            beats: vec!["Arrival".to_string()],
                            connections: vec![LocationId::new("market")],
                            encounters: vec![],
                            sandbox: false,
                        },
                        Location {
                            id: LocationId::new("market"),
                            name: "Night Market".to_string(),
                            description: "Lanterns and rain".to_string(),
                            beats: vec![],
                            connections: vec![],
                            encounters: vec![],
                            sandbox: true,
                        },
                    ],
                },
                Act {
                    id: ActId::new("act-2"),
                    title: "Act Two".to_string(),
                    locations: vec![Location {
                        id: LocationId::new("lighthouse"),
                        name: "Lighthouse".to_string(),
                        description: "The lamp is dark".to_string(),
                        beats: vec![],
                        connections: vec![],
                        encounters: vec![],
                        sandbox: false,
                    }],
                },
            ],
            world_info: vec![],
            characters: vec![],
        }
    }

    #[test]
    fn successor_within_act() {
        let pkg = two_act_package();
        let next = pkg.successor_of(&LocationId::new("docks"));
        assert_eq!(
            next,
            Some(Successor::Next {
                act: ActId::new("act-1"),
                location: LocationId::new("market"),
            })
        );
    }

    #[test]
    fn successor_crosses_act_boundary() {
        let pkg = two_act_package();
        let next = pkg.successor_of(&LocationId::new("market"));
        assert_eq!(
            next,
            Some(Successor::Next {
                act: ActId::new("act-2"),
                location: LocationId::new("lighthouse"),
            })
        );
    }

    #[test]
    fn successor_of_final_location_completes_story() {
        let pkg = two_act_package();
        let next = pkg.successor_of(&LocationId::new("lighthouse"));
        assert_eq!(next, Some(Successor::StoryComplete));
    }

    #[test]
    fn successor_of_unknown_location_is_none() {
        let pkg = two_act_package();
        assert_eq!(pkg.successor_of(&LocationId::new("nowhere")), None);
    }
}
