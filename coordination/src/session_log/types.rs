//! Types for the append-only session log (spec §3, §4.1, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// One line of a session's `.jsonl` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SessionEvent {
    pub fn new(
        event_type: impl Into<String>,
        session_id: SessionId,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            session_id,
            timestamp: Utc::now(),
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
    Pruned,
}

/// Per-session metadata tracked in the `.index.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "completedAt", default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "messageCount", default)]
    pub message_count: u64,
    #[serde(rename = "agentRunCount", default)]
    pub agent_run_count: u64,
    #[serde(rename = "byteSize", default)]
    pub byte_size: u64,
    #[serde(rename = "keepForever", default)]
    pub keep_forever: bool,
    #[serde(rename = "valueScore", default, skip_serializing_if = "Option::is_none")]
    pub value_score: Option<f32>,
}

impl SessionMetadata {
    pub fn new(session_id: SessionId, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            status: SessionStatus::Active,
            user_id,
            created_at: now,
            updated_at: now,
            completed_at: None,
            message_count: 0,
            agent_run_count: 0,
            byte_size: 0,
            keep_forever: false,
            value_score: None,
        }
    }
}

/// Sidecar index file format (`sessionDir/.index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndex {
    pub version: u32,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    pub sessions: Vec<SessionMetadata>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self {
            version: 1,
            last_updated: Utc::now(),
            sessions: Vec::new(),
        }
    }
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for `SessionLog::cleanup`.
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    pub max_age_ms: Option<i64>,
    pub max_sessions: Option<usize>,
    pub keep_active: bool,
}

/// A fully loaded session: metadata plus its ordered events.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub metadata: SessionMetadata,
    pub events: Vec<SessionEvent>,
    pub malformed_lines: usize,
}
