// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Durable session persistence in a local SQLite file.
//!
//! Every operation opens a short-lived connection and closes it on return;
//! with per-message writes and no throughput requirement this sidesteps
//! long-held locks entirely.  `tool_calls` round-trip as a JSON array with
//! nested argument objects, exactly the in-memory shape.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use agentichat_backend::{Message, Role, ToolCall};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub backend: String,
    pub model: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub message_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub session_id: String,
    pub backend: String,
    pub model: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub message_count: u64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub total_tokens: u64,
    pub total_chars: u64,
    pub compression_count: u64,
}

pub struct SessionStore {
    db_path: PathBuf,
}

impl SessionStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Create tables and indexes; safe to call on every startup.
    pub fn initialize(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at REAL NOT NULL,
                updated_at REAL NOT NULL,
                backend TEXT NOT NULL,
                model TEXT NOT NULL,
                metadata TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT,
                tool_call_id TEXT,
                created_at REAL NOT NULL,
                token_count INTEGER,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS compressions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                original_count INTEGER NOT NULL,
                compressed_count INTEGER NOT NULL,
                summary TEXT NOT NULL,
                created_at REAL NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_compressions_session
                ON compressions(session_id, created_at);",
        )?;
        info!(path = %self.db_path.display(), "session database initialized");
        Ok(())
    }

    pub fn create_session(&self, backend: &str, model: &str) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        let now = now_epoch();
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (id, created_at, updated_at, backend, model, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, now, now, backend, model, "{}"],
        )?;
        info!(session = %session_id, backend, model, "created session");
        Ok(session_id)
    }

    /// Append one message.  `tool_calls` are serialized as a JSON array with
    /// nested (never stringified) argument objects.
    pub fn save_message(
        &self,
        session_id: &str,
        message: &Message,
        token_count: Option<u64>,
    ) -> Result<(), StoreError> {
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let role = role_str(message.role);
        let now = now_epoch();

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO messages (session_id, role, content, tool_calls, tool_call_id, created_at, token_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                role,
                message.content,
                tool_calls_json,
                message.tool_call_id,
                now,
                token_count
            ],
        )?;
        conn.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        debug!(session = %session_id, role, "saved message");
        Ok(())
    }

    /// Rebuild the ordered message list of a session, recovering tool calls.
    /// The rowid breaks `created_at` ties so load order equals insert order.
    pub fn load_session_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, tool_calls, tool_call_id
             FROM messages
             WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, tool_calls_json, tool_call_id) = row?;
            let role = parse_role(&role)
                .ok_or_else(|| StoreError::Invalid(format!("unknown role '{role}'")))?;
            let tool_calls: Option<Vec<ToolCall>> = tool_calls_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?;
            messages.push(Message { role, content, tool_calls, tool_call_id });
        }
        Ok(messages)
    }

    pub fn session_stats(&self, session_id: &str) -> Result<Option<SessionStats>, StoreError> {
        let conn = self.open()?;
        let session = conn
            .query_row(
                "SELECT backend, model, created_at, updated_at FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((backend, model, created_at, updated_at)) = session else {
            return Ok(None);
        };

        let (message_count, user_messages, assistant_messages, total_tokens, total_chars) = conn
            .query_row(
                "SELECT
                    COUNT(*),
                    SUM(CASE WHEN role = 'user' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN role = 'assistant' THEN 1 ELSE 0 END),
                    SUM(COALESCE(token_count, 0)),
                    SUM(LENGTH(content))
                 FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<u64>>(1)?.unwrap_or(0),
                        row.get::<_, Option<u64>>(2)?.unwrap_or(0),
                        row.get::<_, Option<u64>>(3)?.unwrap_or(0),
                        row.get::<_, Option<u64>>(4)?.unwrap_or(0),
                    ))
                },
            )?;

        let compression_count = conn.query_row(
            "SELECT COUNT(*) FROM compressions WHERE session_id = ?1",
            params![session_id],
            |row| row.get::<_, u64>(0),
        )?;

        Ok(Some(SessionStats {
            session_id: session_id.to_string(),
            backend,
            model,
            created_at,
            updated_at,
            message_count,
            user_messages,
            assistant_messages,
            total_tokens,
            total_chars,
            compression_count,
        }))
    }

    pub fn save_compression(
        &self,
        session_id: &str,
        original_count: usize,
        compressed_count: usize,
        summary: &str,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO compressions (session_id, original_count, compressed_count, summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, original_count, compressed_count, summary, now_epoch()],
        )?;
        info!(
            session = %session_id,
            original_count,
            compressed_count,
            "saved compression record"
        );
        Ok(())
    }

    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.backend, s.model, s.created_at, s.updated_at, COUNT(m.id)
             FROM sessions s
             LEFT JOIN messages m ON s.id = m.session_id
             GROUP BY s.id
             ORDER BY s.updated_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                backend: row.get(1)?,
                model: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                message_count: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Remove a session; messages and compressions cascade.
    pub fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        info!(session = %session_id, "deleted session");
        Ok(())
    }
}

fn now_epoch() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn parse_role(s: &str) -> Option<Role> {
    match s {
        "system" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
