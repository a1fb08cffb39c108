//! Conversation state machine: `active -> ended`, one way.
//!
//! Appending a message asks the provider for a reply; ending a conversation
//! stores the summary and indexes one embedding per message for retrieval.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{self, Conversation, ConversationStatus, Message};
use crate::llm::{AiProvider, ChatTurn, ConversationContext, Role};

pub const EMBEDDING_EXCERPT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("conversation {id} is {status}")]
    InvalidState {
        id: String,
        status: ConversationStatus,
    },
    #[error("conversation already ended: {0}")]
    AlreadyEnded(String),
    #[error("message content must not be empty")]
    EmptyMessage,
    #[error("conversation title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone, Debug, Serialize)]
pub struct EndedConversation {
    pub conversation: Conversation,
    pub summary: String,
    pub embeddings_indexed: usize,
    /// Messages whose provider returned no vector; they are stored but never score.
    pub embeddings_empty: usize,
}

fn load(conn: &Connection, conversation_id: &str) -> Result<Conversation, LifecycleError> {
    db::get_conversation(conn, conversation_id)?
        .ok_or_else(|| LifecycleError::NotFound(conversation_id.to_string()))
}

fn context_for(conversation: &Conversation) -> ConversationContext {
    ConversationContext::for_conversation(&conversation.id, conversation.title.as_deref())
}

fn history(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| ChatTurn::new(m.sender, m.content.as_str()))
        .collect()
}

fn excerpt(content: &str) -> String {
    content.chars().take(EMBEDDING_EXCERPT_CHARS).collect()
}

pub fn start_conversation(
    conn: &Connection,
    owner_id: Option<&str>,
    title: Option<&str>,
) -> Result<Conversation, LifecycleError> {
    let conversation = db::create_conversation(conn, owner_id, title, &Value::Null)?;
    info!(conversation_id = %conversation.id, "conversation started");
    Ok(conversation)
}

/// Stores the user's message, asks the provider for a reply and stores that too.
///
/// Returns the AI message. The provider sees the earlier turns as history and
/// `content` as the new message.
pub fn append_message(
    conn: &Connection,
    provider: &(impl AiProvider + ?Sized),
    conversation_id: &str,
    content: &str,
) -> Result<Message, LifecycleError> {
    let conversation = load(conn, conversation_id)?;
    if !conversation.is_active() {
        return Err(LifecycleError::InvalidState {
            id: conversation.id,
            status: conversation.status,
        });
    }

    let content = content.trim();
    if content.is_empty() {
        return Err(LifecycleError::EmptyMessage);
    }

    let earlier = db::list_messages(conn, &conversation.id)?;
    let user_message =
        db::insert_message(conn, &conversation.id, Role::User, content, &Value::Null)?;

    let reply = provider.chat_response(&history(&earlier), content, &context_for(&conversation));
    let ai_message =
        match db::insert_message(conn, &conversation.id, Role::Ai, &reply, &Value::Null) {
            Ok(message) => message,
            Err(e) => {
                // A user turn is only kept together with its reply.
                warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "storing AI reply failed; removing user message"
                );
                if let Err(cleanup) = db::delete_message(conn, &user_message.id) {
                    warn!(
                        message_id = %user_message.id,
                        error = %cleanup,
                        "could not remove unanswered user message"
                    );
                }
                return Err(e.into());
            }
        };

    info!(
        conversation_id = %conversation.id,
        provider = provider.name(),
        history_len = earlier.len(),
        "message appended"
    );
    Ok(ai_message)
}

/// Ends an active conversation: stores the summary and one embedding per message.
///
/// Provider calls all happen before anything is written. The status change,
/// summary and embeddings then commit in one transaction, so a store failure
/// leaves the conversation active and the call can be retried. A provider
/// failure on one message yields an empty vector for it and the rest continue.
pub fn end_conversation(
    conn: &Connection,
    provider: &(impl AiProvider + ?Sized),
    conversation_id: &str,
) -> Result<EndedConversation, LifecycleError> {
    let conversation = load(conn, conversation_id)?;
    if conversation.status == ConversationStatus::Ended {
        return Err(LifecycleError::AlreadyEnded(conversation.id));
    }

    let ended_at = db::now_ms();
    let messages = db::list_messages(conn, &conversation.id)?;
    let summary = provider.generate_summary(&history(&messages), &context_for(&conversation));
    let vectors: Vec<Vec<f32>> = messages
        .iter()
        .map(|m| provider.get_embedding(&m.content))
        .collect();
    let embeddings_empty = vectors.iter().filter(|v| v.is_empty()).count();

    let finished = db::with_immediate_transaction(conn, || {
        if !db::finish_conversation(conn, &conversation.id, ended_at, &summary)? {
            return Ok(false);
        }
        for (message, vector) in messages.iter().zip(&vectors) {
            db::insert_embedding(
                conn,
                &conversation.id,
                Some(&message.id),
                vector,
                &excerpt(&message.content),
            )?;
        }
        Ok(true)
    })?;
    if !finished {
        // Another writer ended it while the provider calls were running.
        return Err(LifecycleError::AlreadyEnded(conversation.id));
    }

    if embeddings_empty > 0 {
        warn!(
            conversation_id = %conversation.id,
            provider = provider.name(),
            embeddings_empty,
            "some messages were indexed without a vector"
        );
    }
    info!(
        conversation_id = %conversation.id,
        embeddings_indexed = messages.len(),
        "conversation ended"
    );

    let conversation = load(conn, &conversation.id)?;
    Ok(EndedConversation {
        conversation,
        summary,
        embeddings_indexed: messages.len(),
        embeddings_empty,
    })
}

pub fn rename_conversation(
    conn: &Connection,
    conversation_id: &str,
    title: &str,
) -> Result<Conversation, LifecycleError> {
    if title.trim().is_empty() {
        return Err(LifecycleError::EmptyTitle);
    }
    if !db::rename_conversation(conn, conversation_id, title)? {
        return Err(LifecycleError::NotFound(conversation_id.to_string()));
    }
    load(conn, conversation_id)
}

pub fn delete_conversation(conn: &Connection, conversation_id: &str) -> Result<(), LifecycleError> {
    if !db::delete_conversation(conn, conversation_id)? {
        return Err(LifecycleError::NotFound(conversation_id.to_string()));
    }
    info!(conversation_id, "conversation deleted");
    Ok(())
}
