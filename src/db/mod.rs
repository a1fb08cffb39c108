use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::Role;
use crate::vector::{vector_from_blob, vector_to_blob};

const CONVERSATION_COLUMNS: &str = r#"c.id, c.owner_id, c.title, c.participants, c.status,
    c.start_time, c.end_time, c.summary, c.metadata"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Ended,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Ended => "ended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ConversationStatus::Active),
            "ended" => Some(ConversationStatus::Ended),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: Option<String>,
    pub title: Option<String>,
    pub participants: Vec<String>,
    pub status: ConversationStatus,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub summary: Option<String>,
    pub metadata: Value,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    /// Stored title, or the short id-based default when none was given.
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => default_title(&self.id),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub message_count: i64,
    pub last_activity_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: Role,
    pub content: String,
    pub created_at_ms: i64,
    pub metadata: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct Embedding {
    pub id: String,
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub vector: Vec<f32>,
    pub excerpt: String,
    pub created_at_ms: i64,
}

/// An embedding joined with what retrieval needs to explain a hit.
#[derive(Clone, Debug)]
pub struct EmbeddingWithContext {
    pub embedding: Embedding,
    pub conversation_title: String,
    /// `None` once the source message has been deleted.
    pub sender: Option<Role>,
}

pub fn default_title(conversation_id: &str) -> String {
    let short: String = conversation_id.chars().take(8).collect();
    format!("Conversation {short}")
}

fn db_path(app_dir: &Path) -> PathBuf {
    app_dir.join("chatportal.sqlite3")
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let mut user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if user_version < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS conversations (
  id TEXT PRIMARY KEY,
  owner_id TEXT,
  title TEXT,
  participants TEXT NOT NULL DEFAULT '[]',
  status TEXT NOT NULL DEFAULT 'active',
  start_time INTEGER NOT NULL,
  end_time INTEGER,
  summary TEXT,
  metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS messages (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  sender TEXT NOT NULL,
  content TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  metadata TEXT NOT NULL DEFAULT '{}',
  FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_created_at
  ON messages(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id);
"#,
        )?;
        conn.execute_batch("PRAGMA user_version = 1;")?;
        user_version = 1;
    }

    if user_version < 2 {
        // v2: per-message embeddings written when a conversation ends. The message link is a
        // plain reference, so deleting a message keeps its excerpt searchable.
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS embeddings (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  message_id TEXT,
  vector BLOB NOT NULL,
  excerpt TEXT NOT NULL DEFAULT '',
  created_at INTEGER NOT NULL,
  FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
  FOREIGN KEY(message_id) REFERENCES messages(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_conversation ON embeddings(conversation_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_message ON embeddings(message_id);
PRAGMA user_version = 2;
"#,
        )?;
    }

    Ok(())
}

pub fn open(app_dir: &Path) -> Result<Connection> {
    fs::create_dir_all(app_dir)?;
    let conn = Connection::open(db_path(app_dir))?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

/// Runs `f` inside `BEGIN IMMEDIATE`; any error rolls every write back.
pub fn with_immediate_transaction<T>(
    conn: &Connection,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    match f() {
        Ok(v) => {
            conn.execute_batch("COMMIT;")?;
            Ok(v)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

fn parse_json_column(raw: &str, column: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| anyhow!("invalid json in {column}: {e}"))
}

fn parse_role(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow!("unknown message sender: {raw}"))
}

type ConversationRow = (
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    i64,
    Option<i64>,
    Option<String>,
    String,
);

fn read_conversation_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn conversation_from_row(raw: ConversationRow) -> Result<Conversation> {
    let (id, owner_id, title, participants, status, start_time_ms, end_time_ms, summary, metadata) =
        raw;

    let status = ConversationStatus::parse(&status)
        .ok_or_else(|| anyhow!("unknown conversation status: {status}"))?;
    let participants: Vec<String> = serde_json::from_str(&participants)
        .map_err(|e| anyhow!("invalid json in conversations.participants: {e}"))?;

    Ok(Conversation {
        id,
        owner_id,
        title,
        participants,
        status,
        start_time_ms,
        end_time_ms,
        summary,
        metadata: parse_json_column(&metadata, "conversations.metadata")?,
    })
}

pub fn create_conversation(
    conn: &Connection,
    owner_id: Option<&str>,
    title: Option<&str>,
    metadata: &Value,
) -> Result<Conversation> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_ms();
    let title = match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => default_title(&id),
    };
    let metadata = if metadata.is_null() {
        Value::Object(Default::default())
    } else {
        metadata.clone()
    };

    conn.execute(
        r#"INSERT INTO conversations
             (id, owner_id, title, participants, status, start_time, metadata)
           VALUES (?1, ?2, ?3, '[]', 'active', ?4, ?5)"#,
        params![id, owner_id, title, now, serde_json::to_string(&metadata)?],
    )?;

    Ok(Conversation {
        id,
        owner_id: owner_id.map(ToString::to_string),
        title: Some(title),
        participants: Vec::new(),
        status: ConversationStatus::Active,
        start_time_ms: now,
        end_time_ms: None,
        summary: None,
        metadata,
    })
}

pub fn get_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    let raw = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?1"),
            params![id],
            read_conversation_row,
        )
        .optional()?;

    raw.map(conversation_from_row).transpose()
}

/// Conversations ordered by most recent message, then by start time.
pub fn list_conversations(conn: &Connection) -> Result<Vec<ConversationListItem>> {
    let mut stmt = conn.prepare(&format!(
        r#"SELECT {CONVERSATION_COLUMNS}, COUNT(m.id), MAX(m.created_at) AS last_activity
           FROM conversations c
           LEFT JOIN messages m ON m.conversation_id = c.id
           GROUP BY c.id
           ORDER BY last_activity DESC, c.start_time DESC, c.rowid DESC"#
    ))?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let raw = read_conversation_row(row)?;
        let message_count: i64 = row.get(9)?;
        let last_activity_ms: Option<i64> = row.get(10)?;
        result.push(ConversationListItem {
            conversation: conversation_from_row(raw)?,
            message_count,
            last_activity_ms,
        });
    }

    Ok(result)
}

pub fn list_conversations_newest_first(conn: &Connection) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        r#"SELECT {CONVERSATION_COLUMNS}
           FROM conversations c
           ORDER BY c.start_time DESC, c.rowid DESC"#
    ))?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(conversation_from_row(read_conversation_row(row)?)?);
    }

    Ok(result)
}

/// Returns `false` when no conversation has this id.
pub fn rename_conversation(conn: &Connection, id: &str, title: &str) -> Result<bool> {
    let title = title.trim();
    if title.is_empty() {
        return Err(anyhow!("conversation title must not be blank"));
    }
    let changed = conn.execute(
        r#"UPDATE conversations SET title = ?2 WHERE id = ?1"#,
        params![id, title],
    )?;
    Ok(changed > 0)
}

/// Deletes the conversation with its messages and embeddings.
pub fn delete_conversation(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute(r#"DELETE FROM conversations WHERE id = ?1"#, params![id])?;
    Ok(changed > 0)
}

/// Moves an active conversation to `ended`, writing end time and summary in the same update.
///
/// Returns `false` if the conversation is missing or no longer active.
pub fn finish_conversation(
    conn: &Connection,
    id: &str,
    end_time_ms: i64,
    summary: &str,
) -> Result<bool> {
    let changed = conn.execute(
        r#"UPDATE conversations
           SET status = 'ended', end_time = ?2, summary = ?3
           WHERE id = ?1 AND status = 'active'"#,
        params![id, end_time_ms, summary],
    )?;
    Ok(changed > 0)
}

pub fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    sender: Role,
    content: &str,
    metadata: &Value,
) -> Result<Message> {
    let id = uuid::Uuid::new_v4().to_string();

    // Keep timestamps non-decreasing within a conversation even if the wall clock steps back.
    let last: Option<i64> = conn.query_row(
        r#"SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1"#,
        params![conversation_id],
        |row| row.get(0),
    )?;
    let now = last.map_or(now_ms(), |last| now_ms().max(last));

    let metadata = if metadata.is_null() {
        Value::Object(Default::default())
    } else {
        metadata.clone()
    };

    conn.execute(
        r#"INSERT INTO messages (id, conversation_id, sender, content, created_at, metadata)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            id,
            conversation_id,
            sender.as_str(),
            content,
            now,
            serde_json::to_string(&metadata)?
        ],
    )?;

    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        sender,
        content: content.to_string(),
        created_at_ms: now,
        metadata,
    })
}

/// Messages in conversation order: by timestamp, ties in insertion order.
pub fn list_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, sender, content, created_at, metadata
           FROM messages
           WHERE conversation_id = ?1
           ORDER BY created_at ASC, rowid ASC"#,
    )?;

    let mut rows = stmt.query(params![conversation_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let sender: String = row.get(1)?;
        let content: String = row.get(2)?;
        let created_at_ms: i64 = row.get(3)?;
        let metadata: String = row.get(4)?;

        result.push(Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender: parse_role(&sender)?,
            content,
            created_at_ms,
            metadata: parse_json_column(&metadata, "messages.metadata")?,
        });
    }

    Ok(result)
}

pub fn delete_message(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute(r#"DELETE FROM messages WHERE id = ?1"#, params![id])?;
    Ok(changed > 0)
}

pub fn insert_embedding(
    conn: &Connection,
    conversation_id: &str,
    message_id: Option<&str>,
    vector: &[f32],
    excerpt: &str,
) -> Result<Embedding> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_ms();

    conn.execute(
        r#"INSERT INTO embeddings (id, conversation_id, message_id, vector, excerpt, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            id,
            conversation_id,
            message_id,
            vector_to_blob(vector),
            excerpt,
            now
        ],
    )?;

    Ok(Embedding {
        id,
        conversation_id: conversation_id.to_string(),
        message_id: message_id.map(ToString::to_string),
        vector: vector.to_vec(),
        excerpt: excerpt.to_string(),
        created_at_ms: now,
    })
}

/// Every stored embedding with its conversation title and source sender, in creation order.
pub fn list_embeddings_with_context(conn: &Connection) -> Result<Vec<EmbeddingWithContext>> {
    let mut stmt = conn.prepare(
        r#"SELECT e.id, e.conversation_id, e.message_id, e.vector, e.excerpt, e.created_at,
                  c.title, m.sender
           FROM embeddings e
           JOIN conversations c ON c.id = e.conversation_id
           LEFT JOIN messages m ON m.id = e.message_id
           ORDER BY e.created_at ASC, e.rowid ASC"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let conversation_id: String = row.get(1)?;
        let message_id: Option<String> = row.get(2)?;
        let vector_blob: Vec<u8> = row.get(3)?;
        let excerpt: String = row.get(4)?;
        let created_at_ms: i64 = row.get(5)?;
        let title: Option<String> = row.get(6)?;
        let sender: Option<String> = row.get(7)?;

        let conversation_title = match title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => default_title(&conversation_id),
        };

        result.push(EmbeddingWithContext {
            embedding: Embedding {
                id,
                conversation_id,
                message_id,
                vector: vector_from_blob(&vector_blob)?,
                excerpt,
                created_at_ms,
            },
            conversation_title,
            sender: sender.as_deref().map(parse_role).transpose()?,
        });
    }

    Ok(result)
}

pub fn list_embeddings_for_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<Embedding>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, message_id, vector, excerpt, created_at
           FROM embeddings
           WHERE conversation_id = ?1
           ORDER BY created_at ASC, rowid ASC"#,
    )?;

    let mut rows = stmt.query(params![conversation_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let vector_blob: Vec<u8> = row.get(2)?;
        result.push(Embedding {
            id: row.get(0)?,
            conversation_id: conversation_id.to_string(),
            message_id: row.get(1)?,
            vector: vector_from_blob(&vector_blob)?,
            excerpt: row.get(3)?,
            created_at_ms: row.get(4)?,
        });
    }

    Ok(result)
}

pub fn count_embeddings(conn: &Connection, conversation_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        r#"SELECT COUNT(*) FROM embeddings WHERE conversation_id = ?1"#,
        params![conversation_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
