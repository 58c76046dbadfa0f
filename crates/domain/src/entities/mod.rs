mod package;

pub use package::{
    Act, CharacterSeed, Encounter, Location, StoryPackage, Successor, WorldInfoEntry,
};
