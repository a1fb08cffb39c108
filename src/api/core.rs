use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::{build_provider, AppConfig};
use crate::db::{self, Conversation, ConversationListItem, Message};
use crate::lifecycle::{self, EndedConversation, LifecycleError};
use crate::llm::AiProvider;
use crate::rag::{self, QueryMode, QueryResponse};

#[derive(Clone, Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// One store, one provider and the query mode chosen for them.
pub struct Portal {
    conn: Connection,
    provider: Box<dyn AiProvider>,
    query_mode: QueryMode,
}

impl Portal {
    pub fn open(config: &AppConfig) -> Result<Self> {
        let conn = db::open(&config.data_dir)?;
        Ok(Self::new(
            conn,
            build_provider(config),
            config.default_query_mode(),
        ))
    }

    pub fn new(conn: Connection, provider: Box<dyn AiProvider>, query_mode: QueryMode) -> Self {
        Self {
            conn,
            provider,
            query_mode,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn query_mode(&self) -> QueryMode {
        self.query_mode
    }

    pub fn start_conversation(
        &self,
        owner_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<Conversation, LifecycleError> {
        lifecycle::start_conversation(&self.conn, owner_id, title)
    }

    pub fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, LifecycleError> {
        lifecycle::append_message(&self.conn, self.provider.as_ref(), conversation_id, content)
    }

    pub fn end_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<EndedConversation, LifecycleError> {
        lifecycle::end_conversation(&self.conn, self.provider.as_ref(), conversation_id)
    }

    pub fn query(&self, text: &str) -> Result<QueryResponse> {
        self.query_with_mode(text, self.query_mode)
    }

    pub fn query_with_mode(&self, text: &str, mode: QueryMode) -> Result<QueryResponse> {
        rag::query(&self.conn, self.provider.as_ref(), text, mode)
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationListItem>> {
        db::list_conversations(&self.conn)
    }

    pub fn conversation_detail(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationDetail, LifecycleError> {
        let conversation = db::get_conversation(&self.conn, conversation_id)?
            .ok_or_else(|| LifecycleError::NotFound(conversation_id.to_string()))?;
        let messages = db::list_messages(&self.conn, conversation_id)?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    pub fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<Conversation, LifecycleError> {
        lifecycle::rename_conversation(&self.conn, conversation_id, title)
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> Result<(), LifecycleError> {
        lifecycle::delete_conversation(&self.conn, conversation_id)
    }
}
