//! Use cases: the turn pipeline and its stages.

pub mod combat;
pub mod context;
pub mod director;
pub mod plot;
pub mod resolver;
pub mod storyteller;
pub mod turn;
