//! Storyloom engine library.
//!
//! Turn orchestration for a session-based interactive narrative: the
//! Director policy step, the storyteller tool loop, the nested combat
//! engine and the context compressor, wired over typed storage and LLM
//! ports.
//!
//! ## Structure
//!
//! - `infrastructure/` - ports and adapters (LLM client, stores, caches)
//! - `use_cases/` - the turn pipeline and its stages

pub mod infrastructure;
pub mod use_cases;

/// Test fixtures shared across integration-style tests.
#[cfg(test)]
pub mod test_fixtures;

/// End-to-end turn flows over scripted models.
#[cfg(test)]
mod e2e_tests;
