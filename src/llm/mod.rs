use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod mock;
pub mod openai;
pub mod prompts;
pub mod timeouts;

pub use mock::MockProvider;
pub use openai::OpenAiCompatibleProvider;
pub use prompts::ProviderFlavor;

pub const CHAT_FALLBACK_REPLY: &str =
    "I'm here and ready! Could you please rephrase or tell me more!";
pub const SUMMARY_FALLBACK: &str = "No meaningful summary could be generated.";
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in past conversations.";
pub const ANSWER_FALLBACK: &str =
    "I couldn't put together an answer from the retrieved excerpts.";

const CONTROL_TOKENS: [&str; 4] = ["<s>", "</s>", "[INST]", "[/INST]"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "ai",
            Role::System => "system",
        }
    }

    /// Accepts the stored names plus `assistant`, which some clients send for AI turns.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "ai" | "assistant" => Some(Role::Ai),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Conversation-level facts handed to a provider alongside the turns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationContext {
    pub conversation_id: Option<String>,
    pub title: Option<String>,
}

impl ConversationContext {
    pub fn for_conversation(conversation_id: &str, title: Option<&str>) -> Self {
        Self {
            conversation_id: Some(conversation_id.to_string()),
            title: title.map(ToString::to_string),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("could not reach provider: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("provider request failed: HTTP {status} {body}")]
    Http { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    Malformed(String),
    #[error("provider returned no usable output")]
    EmptyOutput,
}

/// Capability contract shared by every AI backend.
///
/// Implementors provide the fallible `try_*` operations. Callers use the plain
/// operations, which never fail: provider errors collapse into a readable
/// string, or an empty vector for embeddings.
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    fn try_chat_response(
        &self,
        history: &[ChatTurn],
        new_message: &str,
        context: &ConversationContext,
    ) -> Result<String, ProviderError>;

    fn try_generate_summary(
        &self,
        messages: &[ChatTurn],
        context: &ConversationContext,
    ) -> Result<String, ProviderError>;

    fn try_get_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn try_answer_query(
        &self,
        query: &str,
        context: &[String],
        conversation_context: &ConversationContext,
    ) -> Result<String, ProviderError>;

    fn chat_response(
        &self,
        history: &[ChatTurn],
        new_message: &str,
        context: &ConversationContext,
    ) -> String {
        match self.try_chat_response(history, new_message, context) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => CHAT_FALLBACK_REPLY.to_string(),
            Err(e) => {
                warn!(provider = self.name(), error = %e, "chat response failed");
                format!("(Error contacting {}: {e})", self.name())
            }
        }
    }

    fn generate_summary(&self, messages: &[ChatTurn], context: &ConversationContext) -> String {
        match self.try_generate_summary(messages, context) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => SUMMARY_FALLBACK.to_string(),
            Err(e) => {
                warn!(provider = self.name(), error = %e, "summary generation failed");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }

    /// Empty means "no embedding available"; callers skip scoring against it.
    fn get_embedding(&self, text: &str) -> Vec<f32> {
        match self.try_get_embedding(text) {
            Ok(vector) => vector,
            Err(e) => {
                warn!(provider = self.name(), error = %e, "embedding request failed");
                Vec::new()
            }
        }
    }

    fn answer_query(
        &self,
        query: &str,
        context: &[String],
        conversation_context: &ConversationContext,
    ) -> String {
        if context.is_empty() {
            return NO_CONTEXT_ANSWER.to_string();
        }
        match self.try_answer_query(query, context, conversation_context) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => ANSWER_FALLBACK.to_string(),
            Err(e) => {
                warn!(provider = self.name(), error = %e, "query answer failed");
                format!("(Error contacting {}: {e})", self.name())
            }
        }
    }
}

/// Removes instruction-format markers some chat models echo back.
pub fn strip_control_tokens(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        out = out.replace(token, "");
    }
    out.trim().to_string()
}
