use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts::{wire_role, ProviderFlavor};
use super::{
    strip_control_tokens, timeouts, AiProvider, ChatTurn, ConversationContext, ProviderError,
    Role,
};

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

pub fn embeddings_url(base_url: &str) -> String {
    format!("{}/embeddings", base_url.trim_end_matches('/'))
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl WireMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The response shapes we accept from chat-completions servers, most common first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionBody {
    Choices { choices: Vec<ChatChoice> },
    Message { message: ChatChoiceMessage },
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
    encoding_format: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// Extracts the assistant text from a non-streaming chat completion.
pub fn parse_chat_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatCompletionBody = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid chat completion json: {e}")))?;

    let content = match parsed {
        ChatCompletionBody::Choices { choices } => choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("chat completion has no choices".to_string()))?
            .message
            .content
            .unwrap_or_default(),
        ChatCompletionBody::Message { message } => message.content.unwrap_or_default(),
        ChatCompletionBody::Text { text } => text,
    };

    Ok(content.trim().to_string())
}

pub fn parse_embeddings_response(
    body: &str,
    expected_len: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let parsed: EmbeddingsResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid embeddings json: {e}")))?;

    if parsed.data.len() != expected_len {
        return Err(ProviderError::Malformed(format!(
            "expected {expected_len} embeddings, got {}",
            parsed.data.len()
        )));
    }

    let mut out: Vec<Option<Vec<f32>>> = vec![None; expected_len];
    for item in parsed.data {
        if item.index >= expected_len {
            return Err(ProviderError::Malformed(format!(
                "embedding index out of range: {} (expected < {expected_len})",
                item.index
            )));
        }
        if item.embedding.is_empty() {
            return Err(ProviderError::Malformed("embedding dim is 0".to_string()));
        }
        out[item.index] = Some(item.embedding);
    }

    out.into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| ProviderError::Malformed(format!("missing embedding at index {i}")))
        })
        .collect()
}

/// Networked provider for any server that speaks the chat-completions and
/// embeddings dialect (OpenAI, LM Studio, OpenRouter).
pub struct OpenAiCompatibleProvider {
    client: Client,
    flavor: ProviderFlavor,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embed_model: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        flavor: ProviderFlavor,
        base_url: String,
        api_key: Option<String>,
        chat_model: String,
        embed_model: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            flavor,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            chat_model,
            embed_model,
        }
    }

    pub fn with_defaults(flavor: ProviderFlavor, api_key: Option<String>) -> Self {
        Self::new(
            flavor,
            flavor.default_base_url().to_string(),
            api_key,
            flavor.default_chat_model().to_string(),
            flavor.default_embed_model().map(ToString::to_string),
        )
    }

    pub fn flavor(&self) -> ProviderFlavor {
        self.flavor
    }

    fn post_json<T: Serialize>(
        &self,
        url: String,
        body: &T,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        if self.flavor.requires_api_key() && self.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "{} api key",
                self.flavor.name()
            )));
        }

        let mut req = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .timeout(timeout);
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        for (name, value) in self.flavor.extra_headers() {
            req = req.header(*name, *value);
        }

        let resp = req.send()?;
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn complete(
        &self,
        messages: Vec<WireMessage>,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        let prompt_chars = messages.iter().map(|m| m.content.chars().count()).sum();
        let req = ChatCompletionsRequest {
            model: self.chat_model.clone(),
            messages,
            temperature,
            stream: false,
        };

        let body = self.post_json(
            chat_completions_url(&self.base_url),
            &req,
            timeouts::chat_timeout_for_prompt_chars(prompt_chars),
        )?;
        let raw = parse_chat_completion(&body)?;
        Ok(strip_control_tokens(&raw))
    }

    fn one_shot(&self, prompt: String) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(2);
        if self.flavor.one_shot_uses_system_prompt() {
            if let Some(system) = self.flavor.system_prompt() {
                messages.push(WireMessage::new("system", system));
            }
        }
        messages.push(WireMessage::new("user", prompt));
        messages
    }
}

impl AiProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn try_chat_response(
        &self,
        history: &[ChatTurn],
        new_message: &str,
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = self.flavor.system_prompt() {
            messages.push(WireMessage::new("system", system));
        }
        for turn in history {
            messages.push(WireMessage::new(wire_role(turn.role), turn.content.as_str()));
        }
        messages.push(WireMessage::new(wire_role(Role::User), new_message.trim()));

        self.complete(messages, self.flavor.chat_temperature())
    }

    fn try_generate_summary(
        &self,
        messages: &[ChatTurn],
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        let prompt = self.flavor.summary_prompt(messages);
        let text = self.complete(self.one_shot(prompt), self.flavor.summary_temperature())?;
        Ok(self.flavor.clean_summary(&text))
    }

    fn try_get_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let Some(model) = self.embed_model.as_deref() else {
            debug!(provider = self.name(), "embeddings not supported; returning empty vector");
            return Ok(Vec::new());
        };

        let req = EmbeddingsRequest {
            model: model.to_string(),
            input: vec![text.to_string()],
            encoding_format: "float".to_string(),
        };
        let body = self.post_json(
            embeddings_url(&self.base_url),
            &req,
            timeouts::embedding_timeout_for_text_chars(text.chars().count()),
        )?;

        let mut parsed = parse_embeddings_response(&body, 1)?;
        parsed.pop().ok_or(ProviderError::EmptyOutput)
    }

    fn try_answer_query(
        &self,
        query: &str,
        context: &[String],
        _conversation_context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        let prompt = self.flavor.answer_prompt(query, context);
        self.complete(self.one_shot(prompt), self.flavor.answer_temperature())
    }
}
