//! Per-backend prompt templates and request defaults.
//!
//! Every networked backend speaks the same chat-completions dialect; they only
//! differ in the wording they send and a few transport details kept here.

use super::{ChatTurn, Role};

const OPENAI_SYSTEM_PROMPT: &str = "You are a helpful AI chat assistant.";
const OPENROUTER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Respond clearly and conversationally. \
Always reply with useful text and never return empty or whitespace.";
const OPENROUTER_SUMMARY_MARKER: &str = "🧠 Summary:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderFlavor {
    OpenAi,
    LmStudio,
    OpenRouter,
}

impl ProviderFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderFlavor::OpenAi => "openai",
            ProviderFlavor::LmStudio => "lmstudio",
            ProviderFlavor::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderFlavor::OpenAi => "https://api.openai.com/v1",
            ProviderFlavor::LmStudio => "http://localhost:1234/v1",
            ProviderFlavor::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_chat_model(&self) -> &'static str {
        match self {
            ProviderFlavor::OpenAi => "gpt-3.5-turbo",
            ProviderFlavor::LmStudio => "qwen/qwen3-8b",
            ProviderFlavor::OpenRouter => "mistralai/mistral-7b-instruct",
        }
    }

    /// `None` means the backend has no embedding endpoint we use.
    pub fn default_embed_model(&self) -> Option<&'static str> {
        match self {
            ProviderFlavor::OpenAi => Some("text-embedding-3-small"),
            ProviderFlavor::LmStudio => Some("text-embedding-nomic-embed-text-v1.5"),
            ProviderFlavor::OpenRouter => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderFlavor::LmStudio)
    }

    pub fn system_prompt(&self) -> Option<&'static str> {
        match self {
            ProviderFlavor::OpenAi => Some(OPENAI_SYSTEM_PROMPT),
            ProviderFlavor::LmStudio => None,
            ProviderFlavor::OpenRouter => Some(OPENROUTER_SYSTEM_PROMPT),
        }
    }

    /// Whether one-shot prompts (summary, answer) also carry the system prompt.
    pub fn one_shot_uses_system_prompt(&self) -> bool {
        matches!(self, ProviderFlavor::OpenRouter)
    }

    pub fn chat_temperature(&self) -> Option<f32> {
        match self {
            ProviderFlavor::OpenAi | ProviderFlavor::LmStudio => Some(0.7),
            ProviderFlavor::OpenRouter => None,
        }
    }

    pub fn summary_temperature(&self) -> Option<f32> {
        match self {
            ProviderFlavor::OpenAi => Some(0.3),
            _ => self.chat_temperature(),
        }
    }

    pub fn answer_temperature(&self) -> Option<f32> {
        match self {
            ProviderFlavor::OpenAi => Some(0.4),
            _ => self.chat_temperature(),
        }
    }

    pub fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProviderFlavor::OpenRouter => &[
                ("HTTP-Referer", "http://localhost:5173"),
                ("X-Title", "AI Chat Portal"),
            ],
            _ => &[],
        }
    }

    pub fn summary_prompt(&self, messages: &[ChatTurn]) -> String {
        match self {
            ProviderFlavor::OpenAi => format!(
                "Summarize this conversation briefly:\n{}",
                transcript(messages, false)
            ),
            ProviderFlavor::LmStudio => format!(
                "Summarize this conversation in 3 sentences:\n\n{}",
                transcript(messages, false)
            ),
            ProviderFlavor::OpenRouter => {
                let mut out = String::new();
                out.push_str("You are an AI assistant that summarizes chat conversations.\n");
                out.push_str(
                    "Summarize the key points of this conversation clearly in 3 to 5 sentences.\n",
                );
                out.push_str(
                    "Focus on what was discussed, questions asked, and answers provided.\n\n",
                );
                out.push_str("Conversation:\n");
                out.push_str(&transcript(messages, true));
                out.push_str("\n\n");
                out.push_str(OPENROUTER_SUMMARY_MARKER);
                out
            }
        }
    }

    pub fn answer_prompt(&self, query: &str, context: &[String]) -> String {
        let joined = context.join("\n");
        match self {
            ProviderFlavor::OpenAi => format!("Context:\n{joined}\n\nQuestion: {query}"),
            ProviderFlavor::LmStudio => format!(
                "Using the following past conversation excerpts, answer this query:\n\n\
                 {joined}\n\nQuestion: {query}"
            ),
            ProviderFlavor::OpenRouter => format!(
                "Using the following past messages, answer this query:\n{joined}\n\nQuery: {query}"
            ),
        }
    }

    pub fn clean_summary(&self, text: &str) -> String {
        match self {
            ProviderFlavor::OpenRouter => text
                .replace(OPENROUTER_SUMMARY_MARKER, "")
                .trim()
                .to_string(),
            _ => text.trim().to_string(),
        }
    }
}

/// Chat-completions role name for a stored sender.
pub fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Ai => "assistant",
        Role::System => "system",
    }
}

/// `sender: content` lines, one per turn.
pub fn transcript(messages: &[ChatTurn], capitalize_sender: bool) -> String {
    messages
        .iter()
        .map(|m| {
            let sender = m.role.as_str();
            let sender = if capitalize_sender {
                capitalize(sender)
            } else {
                sender.to_string()
            };
            format!("{sender}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
