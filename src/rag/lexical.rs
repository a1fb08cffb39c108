use anyhow::Result;
use rusqlite::Connection;

use super::{QueryResponse, ScoredExcerpt};
use crate::db;

/// Case-insensitive substring scan: conversations newest first, messages in
/// conversation order. Every hit is returned; there is no ranking.
pub(super) fn search(
    conn: &Connection,
    query: &str,
    excerpt_chars: usize,
) -> Result<QueryResponse> {
    let needle = query.to_lowercase();
    let mut excerpts = Vec::new();

    for conversation in db::list_conversations_newest_first(conn)? {
        let title = conversation.display_title();
        for message in db::list_messages(conn, &conversation.id)? {
            if !message.content.to_lowercase().contains(&needle) {
                continue;
            }
            excerpts.push(ScoredExcerpt {
                conversation_id: conversation.id.clone(),
                conversation: title.clone(),
                excerpt: message.content.chars().take(excerpt_chars).collect(),
                sender: Some(message.sender),
                score: None,
            });
        }
    }

    if excerpts.is_empty() {
        return Ok(QueryResponse::answer_only(format!(
            "No matches found for '{query}'. Try another keyword."
        )));
    }

    Ok(QueryResponse {
        answer: format!(
            "I found {} relevant message(s) containing '{query}'.",
            excerpts.len()
        ),
        excerpts,
    })
}
