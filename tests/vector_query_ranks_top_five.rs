use std::sync::Mutex;

use chatportal_rust::db;
use chatportal_rust::lifecycle;
use chatportal_rust::llm::{AiProvider, ChatTurn, ConversationContext, ProviderError, Role};
use chatportal_rust::rag::{self, QueryMode};

struct FixedQueryProvider {
    query_vector: Vec<f32>,
    answered_with: Mutex<Vec<Vec<String>>>,
}

impl FixedQueryProvider {
    fn new(query_vector: Vec<f32>) -> Self {
        Self {
            query_vector,
            answered_with: Mutex::new(Vec::new()),
        }
    }
}

impl AiProvider for FixedQueryProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn try_chat_response(
        &self,
        _history: &[ChatTurn],
        _new_message: &str,
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        Ok("ok".to_string())
    }

    fn try_generate_summary(
        &self,
        _messages: &[ChatTurn],
        _context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        Ok("summary".to_string())
    }

    fn try_get_embedding(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.query_vector.clone())
    }

    fn try_answer_query(
        &self,
        _query: &str,
        context: &[String],
        _conversation_context: &ConversationContext,
    ) -> Result<String, ProviderError> {
        self.answered_with
            .lock()
            .expect("lock")
            .push(context.to_vec());
        Ok("synthesized".to_string())
    }
}

fn seed(conn: &rusqlite::Connection, vectors: &[(&str, Vec<f32>)]) -> String {
    let conv = lifecycle::start_conversation(conn, None, Some("Vectors")).expect("start");
    for (text, vector) in vectors {
        let msg = db::insert_message(conn, &conv.id, Role::User, text, &serde_json::Value::Null)
            .expect("insert message");
        db::insert_embedding(conn, &conv.id, Some(&msg.id), vector, text)
            .expect("insert embedding");
    }
    conv.id
}

#[test]
fn vector_query_returns_at_most_five_sorted_by_score() {
    let conn = db::open_in_memory().expect("open db");
    let conv_id = seed(
        &conn,
        &[
            ("east", vec![1.0, 0.0]),
            ("north", vec![0.0, 1.0]),
            ("northeast", vec![1.0, 1.0]),
            ("west", vec![-1.0, 0.0]),
            ("mostly east", vec![1.0, 0.1]),
            ("south", vec![0.0, -1.0]),
            ("east again", vec![2.0, 0.0]),
        ],
    );
    let provider = FixedQueryProvider::new(vec![1.0, 0.0]);

    let resp = rag::query(&conn, &provider, "which way?", QueryMode::Vector).expect("query");

    assert_eq!(resp.answer, "synthesized");
    assert_eq!(resp.excerpts.len(), 5);
    let scores: Vec<f32> = resp.excerpts.iter().map(|e| e.score.expect("score")).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "scores {scores:?}");

    let texts: Vec<&str> = resp.excerpts.iter().map(|e| e.excerpt.as_str()).collect();
    // "east" and "east again" tie at 1.0 and keep storage order.
    assert_eq!(texts, vec!["east", "east again", "mostly east", "northeast", "north"]);
    assert!(resp.excerpts.iter().all(|e| e.conversation_id == conv_id));
    assert!(resp.excerpts.iter().all(|e| e.sender == Some(Role::User)));

    let answered = provider.answered_with.lock().expect("lock");
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0], texts.iter().map(|t| t.to_string()).collect::<Vec<_>>());
}

#[test]
fn empty_query_embedding_still_returns_zero_scored_excerpts() {
    let conn = db::open_in_memory().expect("open db");
    seed(
        &conn,
        &[
            ("one", vec![1.0, 0.0]),
            ("two", vec![0.0, 1.0]),
            ("three", vec![1.0, 1.0]),
        ],
    );
    let provider = FixedQueryProvider::new(Vec::new());

    let resp = rag::query(&conn, &provider, "anything", QueryMode::Vector).expect("query");

    let texts: Vec<&str> = resp.excerpts.iter().map(|e| e.excerpt.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    assert!(resp.excerpts.iter().all(|e| e.score == Some(0.0)));
}

#[test]
fn vector_query_without_embeddings_reports_nothing_found() {
    let conn = db::open_in_memory().expect("open db");
    lifecycle::start_conversation(&conn, None, None).expect("start");
    let provider = FixedQueryProvider::new(vec![1.0]);

    let resp = rag::query(&conn, &provider, "lost", QueryMode::Vector).expect("query");

    assert!(resp.excerpts.is_empty());
    assert_eq!(resp.answer, "No relevant excerpts found for 'lost'.");
    assert!(provider.answered_with.lock().expect("lock").is_empty());
}
