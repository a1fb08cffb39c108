//! Retrieval over past conversations.
//!
//! Two strategies share one entry point: a lexical substring scan over stored
//! messages, and a vector ranking of stored embeddings by cosine similarity to
//! the query embedding. The caller picks the mode; the engine never looks at
//! which provider is active.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{AiProvider, Role};

mod lexical;
mod semantic;

pub const EMPTY_QUERY_ANSWER: &str = "Please enter a query.";

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_LEXICAL_EXCERPT_CHARS: usize = 150;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Lexical,
    Vector,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Lexical => "lexical",
            QueryMode::Vector => "vector",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "keyword" => Ok(QueryMode::Lexical),
            "vector" | "semantic" => Ok(QueryMode::Vector),
            other => Err(format!("unknown query mode: {other}")),
        }
    }
}

/// One retrieved excerpt, in the shape the query endpoint returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredExcerpt {
    pub conversation_id: String,
    /// Conversation title, or its id-based default.
    pub conversation: String,
    pub excerpt: String,
    pub sender: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub excerpts: Vec<ScoredExcerpt>,
}

impl QueryResponse {
    fn answer_only(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            excerpts: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub lexical_excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            lexical_excerpt_chars: DEFAULT_LEXICAL_EXCERPT_CHARS,
        }
    }
}

pub fn query(
    conn: &Connection,
    provider: &(impl AiProvider + ?Sized),
    text: &str,
    mode: QueryMode,
) -> Result<QueryResponse> {
    query_with_config(conn, provider, text, mode, RetrievalConfig::default())
}

/// A blank query returns [`EMPTY_QUERY_ANSWER`] without touching the store or the provider.
pub fn query_with_config(
    conn: &Connection,
    provider: &(impl AiProvider + ?Sized),
    text: &str,
    mode: QueryMode,
    config: RetrievalConfig,
) -> Result<QueryResponse> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(QueryResponse::answer_only(EMPTY_QUERY_ANSWER));
    }

    let response = match mode {
        QueryMode::Lexical => lexical::search(conn, text, config.lexical_excerpt_chars)?,
        QueryMode::Vector => semantic::search(conn, provider, text, config.top_k)?,
    };

    debug!(
        mode = mode.as_str(),
        excerpts = response.excerpts.len(),
        "query answered"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::QueryMode;

    #[test]
    fn query_mode_parses_aliases() {
        assert_eq!("Vector".parse::<QueryMode>(), Ok(QueryMode::Vector));
        assert_eq!("keyword".parse::<QueryMode>(), Ok(QueryMode::Lexical));
        assert!("fuzzy".parse::<QueryMode>().is_err());
    }
}
