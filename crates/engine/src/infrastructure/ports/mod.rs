//! Port traits and shared types for external dependencies.

mod error;
mod external;
mod repos;

pub use error::{LlmError, StoreError};
pub use external::{
    ChatMessage, FinishReason, FrameSink, LlmPort, LlmRequest, LlmResponse, MessageRole,
    TokenUsage, ToolCall, ToolDefinition,
};
pub use repos::{CombatStateRepo, ConversationRepo, PackageRepo, PlayerStateRepo, PlotStateRepo};

#[cfg(test)]
pub use repos::{
    MockCombatStateRepo, MockConversationRepo, MockPackageRepo, MockPlayerStateRepo,
    MockPlotStateRepo,
};
