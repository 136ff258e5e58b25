//! File-backed `SessionLog` (spec §4.1).
//!
//! One append-only `.jsonl` file per session plus a `.index.json`
//! sidecar. Appends for a single session are serialized through a
//! per-session `tokio::sync::Mutex`, guarded by an outer `RwLock` over
//! the map of those mutexes — mirroring the "single-writer per
//! session-id" resource rule of `spec.md` §5 without serializing
//! unrelated sessions against each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::types::{
    CleanupOptions, LoadedSession, SessionEvent, SessionIndex, SessionMetadata, SessionStatus,
};
use crate::error::{CoreError, CoreResult};
use crate::ids::SessionId;

fn session_file(dir: &Path, id: &SessionId) -> PathBuf {
    dir.join(format!("{}.jsonl", id.as_str()))
}

fn index_file(dir: &Path) -> PathBuf {
    dir.join(".index.json")
}

/// Append-only per-session event log with a metadata index.
pub struct SessionLog {
    dir: PathBuf,
    index: RwLock<SessionIndex>,
    write_locks: RwLock<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLog {
    /// Open (or create) a session log rooted at `dir`, rebuilding the
    /// index from disk if it is missing or malformed.
    pub async fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let index = match fs::read_to_string(index_file(&dir)).await {
            Ok(raw) => match serde_json::from_str::<SessionIndex>(&raw) {
                Ok(idx) => idx,
                Err(e) => {
                    warn!(error = %e, "session index malformed, rebuilding from disk");
                    Self::rebuild_index(&dir).await?
                }
            },
            Err(_) => Self::rebuild_index(&dir).await?,
        };

        Ok(Self {
            dir,
            index: RwLock::new(index),
            write_locks: RwLock::new(HashMap::new()),
        })
    }

    async fn rebuild_index(dir: &Path) -> CoreResult<SessionIndex> {
        let mut index = SessionIndex::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let session_id = SessionId::from(stem);
            let raw = fs::read_to_string(&path).await.unwrap_or_default();
            let byte_size = raw.len() as u64;
            let mut lines = raw.lines();
            let first = lines.next();
            let mut message_count: u64 = 0;
            let mut created_at = chrono::Utc::now();
            let mut user_id = None;
            let mut updated_at = created_at;
            if let Some(first_line) = first {
                if let Ok(ev) = serde_json::from_str::<SessionEvent>(first_line) {
                    created_at = ev.timestamp;
                    updated_at = ev.timestamp;
                    user_id = ev.user_id.clone();
                    message_count = 1;
                }
            }
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                message_count += 1;
                if let Ok(ev) = serde_json::from_str::<SessionEvent>(line) {
                    updated_at = ev.timestamp;
                }
            }
            let mut metadata = SessionMetadata::new(session_id, user_id);
            metadata.created_at = created_at;
            metadata.updated_at = updated_at;
            metadata.message_count = message_count;
            metadata.byte_size = byte_size;
            index.sessions.push(metadata);
        }
        info!(sessions = index.sessions.len(), "rebuilt session index from disk");
        Ok(index)
    }

    async fn flush_index(&self) -> CoreResult<()> {
        let mut index = self.index.write().await;
        index.last_updated = chrono::Utc::now();
        let raw = serde_json::to_string_pretty(&*index)?;
        fs::write(index_file(&self.dir), raw).await?;
        Ok(())
    }

    async fn lock_for(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        if let Some(l) = self.write_locks.read().await.get(session_id) {
            return l.clone();
        }
        let mut locks = self.write_locks.write().await;
        locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new session. Fails with `Conflict` if it already exists.
    pub async fn create(&self, session_id: SessionId, user_id: Option<String>) -> CoreResult<()> {
        {
            let index = self.index.read().await;
            if index.sessions.iter().any(|s| s.session_id == session_id) {
                return Err(CoreError::conflict(format!(
                    "session {session_id} already exists"
                )));
            }
        }

        let metadata = SessionMetadata::new(session_id.clone(), user_id.clone());
        {
            let mut index = self.index.write().await;
            index.sessions.push(metadata);
        }
        self.flush_index().await?;

        let event = SessionEvent::new("session.created", session_id.clone(), None);
        let event = match user_id {
            Some(u) => event.with_user(u),
            None => event,
        };
        self.append_raw(&session_id, &event).await?;
        debug!(%session_id, "session created");
        Ok(())
    }

    async fn append_raw(&self, session_id: &SessionId, event: &SessionEvent) -> CoreResult<()> {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let line = serde_json::to_string(event)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(session_file(&self.dir, session_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Append an event to a session, updating its metadata counters.
    pub async fn append(&self, session_id: &SessionId, event: SessionEvent) -> CoreResult<()> {
        {
            let index = self.index.read().await;
            if !index.sessions.iter().any(|s| &s.session_id == session_id) {
                return Err(CoreError::not_found(format!("session {session_id}")));
            }
        }

        self.append_raw(session_id, &event).await?;

        {
            let mut index = self.index.write().await;
            if let Some(meta) = index
                .sessions
                .iter_mut()
                .find(|s| &s.session_id == session_id)
            {
                meta.message_count += 1;
                meta.updated_at = event.timestamp;
                if event.event_type == "agent.run.completed" {
                    meta.agent_run_count += 1;
                }
                if event.event_type == "session.completed" || event.event_type == "session.archived"
                {
                    meta.status = SessionStatus::Archived;
                    meta.completed_at = Some(event.timestamp);
                }
            }
        }
        self.flush_index().await?;
        Ok(())
    }

    /// Load a session's metadata and events. Corrupted lines are
    /// skipped and counted, never fatal.
    pub async fn load(&self, session_id: &SessionId) -> CoreResult<LoadedSession> {
        let metadata = {
            let index = self.index.read().await;
            index
                .sessions
                .iter()
                .find(|s| &s.session_id == session_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("session {session_id}")))?
        };

        let raw = fs::read_to_string(session_file(&self.dir, session_id))
            .await
            .unwrap_or_default();

        let mut events = Vec::new();
        let mut malformed = 0usize;
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionEvent>(line) {
                Ok(ev) => events.push(ev),
                Err(e) => {
                    warn!(%session_id, error = %e, "skipping malformed session log line");
                    malformed += 1;
                }
            }
        }

        Ok(LoadedSession {
            metadata,
            events,
            malformed_lines: malformed,
        })
    }

    /// List all known session metadata, newest first.
    pub async fn list(&self) -> Vec<SessionMetadata> {
        let mut sessions = self.index.read().await.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Mark a session as never eligible for `cleanup`.
    pub async fn keep_forever(&self, session_id: &SessionId, keep: bool) -> CoreResult<()> {
        {
            let mut index = self.index.write().await;
            let meta = index
                .sessions
                .iter_mut()
                .find(|s| &s.session_id == session_id)
                .ok_or_else(|| CoreError::not_found(format!("session {session_id}")))?;
            meta.keep_forever = keep;
        }
        self.flush_index().await
    }

    /// Explicitly archive a session.
    pub async fn archive(&self, session_id: &SessionId) -> CoreResult<()> {
        self.append(
            session_id,
            SessionEvent::new("session.archived", session_id.clone(), None),
        )
        .await
    }

    /// Permanently delete a session's file and index entry.
    pub async fn delete(&self, session_id: &SessionId) -> CoreResult<()> {
        let _ = fs::remove_file(session_file(&self.dir, session_id)).await;
        let mut index = self.index.write().await;
        index.sessions.retain(|s| &s.session_id != session_id);
        drop(index);
        self.flush_index().await
    }

    /// Delete sessions in ascending `updatedAt` order, skipping
    /// `keepForever` sessions and (if requested) active sessions, until
    /// the age/count bounds are satisfied.
    pub async fn cleanup(&self, opts: CleanupOptions) -> CoreResult<Vec<SessionId>> {
        let candidates = {
            let index = self.index.read().await;
            let mut v: Vec<SessionMetadata> = index
                .sessions
                .iter()
                .filter(|s| !s.keep_forever)
                .filter(|s| !(opts.keep_active && s.status == SessionStatus::Active))
                .cloned()
                .collect();
            v.sort_by_key(|s| s.updated_at);
            v
        };

        // Each option selects its own subset of `candidates`; either one
        // applies independently of whether the other is set.
        let age_eligible: Vec<SessionId> = match opts.max_age_ms {
            Some(max_age) => {
                let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(max_age);
                candidates
                    .iter()
                    .filter(|s| s.updated_at < cutoff)
                    .map(|s| s.session_id.clone())
                    .collect()
            }
            None => Vec::new(),
        };

        let count_eligible: Vec<SessionId> = match opts.max_sessions {
            Some(max_sessions) if candidates.len() > max_sessions => {
                let overflow = candidates.len() - max_sessions;
                candidates[..overflow].iter().map(|s| s.session_id.clone()).collect()
            }
            _ => Vec::new(),
        };

        let mut to_delete: Vec<SessionId> = age_eligible;
        for id in count_eligible {
            if !to_delete.contains(&id) {
                to_delete.push(id);
            }
        }

        let mut deleted = Vec::new();
        for session_id in to_delete {
            self.delete(&session_id).await?;
            deleted.push(session_id);
        }
        info!(count = deleted.len(), "cleaned up sessions");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_and_append_round_trip() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        log.create(sid.clone(), Some("user-1".into())).await.unwrap();

        log.append(&sid, SessionEvent::new("task.started", sid.clone(), None))
            .await
            .unwrap();
        log.append(
            &sid,
            SessionEvent::new("agent.run.completed", sid.clone(), None),
        )
        .await
        .unwrap();

        let loaded = log.load(&sid).await.unwrap();
        assert_eq!(loaded.events.len(), 3); // session.created + 2
        assert_eq!(loaded.metadata.agent_run_count, 1);
        assert_eq!(loaded.malformed_lines, 0);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        log.create(sid.clone(), None).await.unwrap();
        let err = log.create(sid.clone(), None).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn append_unknown_session_not_found() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        let err = log
            .append(&sid, SessionEvent::new("x", sid.clone(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        log.create(sid.clone(), None).await.unwrap();

        // Corrupt the file by appending a bad line directly.
        let path = session_file(dir.path(), &sid);
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap();
        f.write_all(b"not json\n").await.unwrap();
        f.flush().await.unwrap();

        let loaded = log.load(&sid).await.unwrap();
        assert_eq!(loaded.malformed_lines, 1);
        assert_eq!(loaded.events.len(), 1);
    }

    #[tokio::test]
    async fn completed_event_archives_session() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        log.create(sid.clone(), None).await.unwrap();
        log.append(
            &sid,
            SessionEvent::new("session.completed", sid.clone(), None),
        )
        .await
        .unwrap();
        let sessions = log.list().await;
        let meta = sessions.iter().find(|s| s.session_id == sid).unwrap();
        assert_eq!(meta.status, SessionStatus::Archived);
        assert!(meta.completed_at.is_some());
    }

    #[tokio::test]
    async fn cleanup_skips_keep_forever() {
        let dir = tempdir().unwrap();
        let log = SessionLog::open(dir.path()).await.unwrap();
        let sid = SessionId::new();
        log.create(sid.clone(), None).await.unwrap();
        log.keep_forever(&sid, true).await.unwrap();

        let deleted = log
            .cleanup(CleanupOptions {
                max_age_ms: Some(0),
                max_sessions: None,
                keep_active: false,
            })
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn index_rebuilds_from_disk_when_missing() {
        let dir = tempdir().unwrap();
        let sid;
        {
            let log = SessionLog::open(dir.path()).await.unwrap();
            sid = SessionId::new();
            log.create(sid.clone(), Some("u".into())).await.unwrap();
        }
        // Simulate a lost index.
        let _ = fs::remove_file(index_file(dir.path())).await;

        let log2 = SessionLog::open(dir.path()).await.unwrap();
        let sessions = log2.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, sid);
    }
}
