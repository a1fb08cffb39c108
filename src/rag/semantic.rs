use std::cmp::Ordering;

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

use super::{QueryResponse, ScoredExcerpt};
use crate::db::{self, EmbeddingWithContext};
use crate::llm::{AiProvider, ConversationContext};
use crate::vector::cosine_similarity;

/// Scores every stored embedding against the query embedding and keeps the top `top_k`.
///
/// An empty query embedding scores everything 0.0; the first `top_k` in
/// storage order are still returned.
pub(super) fn search(
    conn: &Connection,
    provider: &(impl AiProvider + ?Sized),
    query: &str,
    top_k: usize,
) -> Result<QueryResponse> {
    let candidates = db::list_embeddings_with_context(conn)?;
    if candidates.is_empty() || top_k == 0 {
        return Ok(QueryResponse::answer_only(format!(
            "No relevant excerpts found for '{query}'."
        )));
    }

    let query_vector = provider.get_embedding(query);
    if query_vector.is_empty() {
        debug!(provider = provider.name(), "query embedding is empty; all scores are 0");
    }

    let top = rank(&query_vector, candidates, top_k);
    let context: Vec<String> = top.iter().map(|(_, c)| c.embedding.excerpt.clone()).collect();

    let excerpts = top
        .into_iter()
        .map(|(score, c)| ScoredExcerpt {
            conversation_id: c.embedding.conversation_id,
            conversation: c.conversation_title,
            excerpt: c.embedding.excerpt,
            sender: c.sender,
            score: Some(score),
        })
        .collect();

    let answer = provider.answer_query(query, &context, &ConversationContext::default());
    Ok(QueryResponse { answer, excerpts })
}

/// Descending by score; `sort_by` is stable so ties keep storage order.
fn rank(
    query_vector: &[f32],
    candidates: Vec<EmbeddingWithContext>,
    top_k: usize,
) -> Vec<(f32, EmbeddingWithContext)> {
    let mut scored: Vec<(f32, EmbeddingWithContext)> = candidates
        .into_iter()
        .map(|c| (cosine_similarity(query_vector, &c.embedding.vector), c))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}
