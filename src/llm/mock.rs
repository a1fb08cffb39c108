use sha2::{Digest, Sha256};

use super::{AiProvider, ChatTurn, ConversationContext, ProviderError};

pub const MOCK_EMBED_DIM: usize = 32;

/// Offline provider: echoes chat input, samples messages for summaries and
/// derives embeddings from a SHA-256 of the text.
#[derive(Clone, Debug, Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

pub fn mock_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut v: Vec<f32> = digest
        .iter()
        .take(MOCK_EMBED_DIM)
        .map(|b| (f32::from(b % 100) - 50.0) / 50.0)
        .collect();

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn summary_sample(messages: &[ChatTurn]) -> Vec<&str> {
    let texts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    if texts.len() <= 4 {
        return texts;
    }
    let mut sample = texts[..2].to_vec();
    sample.extend_from_slice(&texts[texts.len() - 2..]);
    sample
}

impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn try_chat_response(
        &self,
        _history: &[ChatTurn],
        new_message: &str,
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        Ok(format!(
            "(mock) I got: '{new_message}'. Try asking me for a summary or query."
        ))
    }

    fn try_generate_summary(
        &self,
        messages: &[ChatTurn],
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        if messages.is_empty() {
            return Ok("(mock) No content to summarize.".to_string());
        }
        Ok(format!(
            "(mock) Summary: {}",
            summary_sample(messages).join(" | ")
        ))
    }

    fn try_get_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(mock_embedding(text))
    }

    fn try_answer_query(
        &self,
        query: &str,
        context: &[String],
        _conversation_context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        let joined = context.join("\n---\n");
        Ok(format!(
            "(mock) Based on excerpts:\n{joined}\n\nAnswer to '{query}': (mock) see excerpts above."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn turns(texts: &[&str]) -> Vec<ChatTurn> {
        texts.iter().map(|t| ChatTurn::new(Role::User, *t)).collect()
    }

    #[test]
    fn summary_takes_head_and_tail_without_repeats() {
        let provider = MockProvider::new();
        let ctx = ConversationContext::default();

        let three = provider.generate_summary(&turns(&["a", "b", "c"]), &ctx);
        assert_eq!(three, "(mock) Summary: a | b | c");

        let six = provider.generate_summary(&turns(&["a", "b", "c", "d", "e", "f"]), &ctx);
        assert_eq!(six, "(mock) Summary: a | b | e | f");
    }

    #[test]
    fn embedding_is_unit_length() {
        let v = mock_embedding("hello");
        assert_eq!(v.len(), MOCK_EMBED_DIM);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }
}
