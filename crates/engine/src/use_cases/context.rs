//! Context compressor: bounds conversation-history growth across turns.
//!
//! Below the low-water mark history passes through untouched. At the
//! high-water mark the discarded prefix is summarized into the rolling
//! `story_summary` and only the retained tail survives verbatim.
//! Summarization also runs fire-and-forget after location transitions so
//! the next turn's summary is ready ahead of need.

use std::sync::Arc;

use storyloom_domain::SessionId;

use crate::infrastructure::ports::{
    ChatMessage, ConversationRepo, LlmError, LlmPort, LlmRequest, MessageRole,
};
use crate::use_cases::plot::PlotStates;

#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Below this message count, history is never touched.
    pub low_water: usize,
    /// At or above this count, the prefix is summarized away.
    pub high_water: usize,
    /// Messages retained verbatim after compression.
    pub retain_tail: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            low_water: 20,
            high_water: 30,
            retain_tail: 12,
        }
    }
}

/// Result of preparing history for a turn's prompt.
#[derive(Debug, Clone)]
pub struct PreparedHistory {
    pub messages: Vec<ChatMessage>,
    /// Updated rolling summary, when compression ran this turn.
    pub new_summary: Option<String>,
}

pub struct ContextCompressor {
    llm: Arc<dyn LlmPort>,
    config: CompressorConfig,
}

impl ContextCompressor {
    pub fn new(llm: Arc<dyn LlmPort>, config: CompressorConfig) -> Self {
        Self { llm, config }
    }

    /// Prepare history for this turn's storyteller prompt, summarizing
    /// synchronously when the high-water mark is reached.
    pub async fn prepare(
        &self,
        history: Vec<ChatMessage>,
        story_summary: &str,
    ) -> Result<PreparedHistory, LlmError> {
        let history = sanitize(history);

        if history.len() < self.config.high_water {
            return Ok(PreparedHistory {
                messages: history,
                new_summary: None,
            });
        }

        let split = history.len() - self.config.retain_tail;
        let (prefix, tail) = history.split_at(split);
        let summary = self.summarize(prefix, story_summary).await?;

        Ok(PreparedHistory {
            messages: tail.to_vec(),
            new_summary: Some(summary),
        })
    }

    /// Whether a background pre-summarization is worthwhile: the history
    /// has grown past the low-water mark but a synchronous pass has not
    /// been forced yet.
    pub fn wants_background_pass(&self, history_len: usize) -> bool {
        history_len >= self.config.low_water
    }

    /// Merge the discarded prefix into the rolling summary with one model
    /// call.
    async fn summarize(
        &self,
        prefix: &[ChatMessage],
        story_summary: &str,
    ) -> Result<String, LlmError> {
        let transcript: Vec<String> = prefix
            .iter()
            .filter(|m| m.role == MessageRole::User || m.role == MessageRole::Assistant)
            .filter(|m| !m.content.is_empty())
            .map(|m| {
                let speaker = match m.role {
                    MessageRole::User => "Player",
                    _ => "Narrator",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect();

        let mut prompt = String::new();
        if !story_summary.is_empty() {
            prompt.push_str(&format!("Story summary so far:\n{story_summary}\n\n"));
        }
        prompt.push_str(&format!(
            "Older transcript being compressed:\n{}\n\nWrite an updated story summary in \
             under 200 words. Keep names, promises, open threads and anything the story \
             must not forget. Answer with the summary only.",
            transcript.join("\n")
        ));

        let request = LlmRequest::new(vec![ChatMessage::user(prompt)])
            .with_system_prompt("You compress interactive-fiction history into a dense summary.")
            .with_temperature(0.3);

        let response = self.llm.generate(request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Drop message shapes the model cannot legally continue from: a
/// tool-result with no matching call in a preceding assistant message,
/// and assistant tool calls that never received a result.
pub fn sanitize(history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let answered: std::collections::HashSet<String> = history
        .iter()
        .filter_map(|m| m.tool_call_id.clone())
        .collect();

    let mut issued: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut sanitized = Vec::with_capacity(history.len());

    for mut message in history {
        match message.role {
            MessageRole::Tool => {
                let matched = message
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| issued.contains(id));
                if !matched {
                    tracing::debug!("Dropping orphaned tool-result message");
                    continue;
                }
            }
            MessageRole::Assistant => {
                // Strip calls that never got an answer; keep the text.
                message.tool_calls.retain(|tc| answered.contains(&tc.id));
                for call in &message.tool_calls {
                    issued.insert(call.id.clone());
                }
                if message.tool_calls.is_empty() && message.content.is_empty() {
                    continue;
                }
            }
            _ => {}
        }
        sanitized.push(message);
    }
    sanitized
}

/// Fire-and-forget summarization after a location/act transition, so the
/// next turn's prompt finds `story_summary` already up to date.
pub fn spawn_background_pass(
    compressor: Arc<ContextCompressor>,
    conversations: Arc<dyn ConversationRepo>,
    plots: Arc<PlotStates>,
    session_id: SessionId,
) {
    tokio::spawn(async move {
        let history = match conversations.load(session_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Background summarization: load failed");
                return;
            }
        };
        if !compressor.wants_background_pass(history.len()) {
            return;
        }

        let state = match plots.read(session_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Background summarization: no state");
                return;
            }
        };

        let split = history.len().saturating_sub(compressor.config.retain_tail);
        let sanitized = sanitize(history);
        let split = split.min(sanitized.len());
        let (prefix, tail) = sanitized.split_at(split);
        if prefix.is_empty() {
            return;
        }

        match compressor.summarize(prefix, &state.story_summary).await {
            Ok(summary) => {
                let mut state = state;
                state.story_summary = summary;
                if let Err(e) = plots.save(&state).await {
                    tracing::warn!(%session_id, error = %e, "Background summarization: save failed");
                    return;
                }
                if let Err(e) = conversations.save(session_id, tail).await {
                    tracing::warn!(%session_id, error = %e, "Background summarization: history save failed");
                    return;
                }
                tracing::info!(%session_id, "Background summarization complete");
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Background summarization failed");
            }
        }
    });
}
