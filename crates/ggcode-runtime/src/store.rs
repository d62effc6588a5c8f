//! Session store (§4.H): directory-backed session records with fork,
//! rename, export/import, and retention-policy cleanup.

use std::collections::BTreeSet;
use std::path::PathBuf;

use ggcode_core::{EnhancedMessage, GgcodeHome, LegacyMessage, Role, Session};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Sessions whose `lastActiveAt` is within the `preserve_recent` most
/// recently active are exempt from eviction/cleanup, per spec.md §4.H.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Hard cap on the number of sessions kept.
    pub max_sessions: usize,
    /// Sessions inactive longer than this many days are eligible for
    /// cleanup.
    pub max_inactive_days: u64,
    /// Most-recently-active sessions exempt from eviction and cleanup.
    pub preserve_recent: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_sessions: 100, max_inactive_days: 30, preserve_recent: 5 }
    }
}

/// A full export blob: session metadata plus its message history,
/// per spec.md §4.H `export`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionExport {
    /// The session record.
    pub info: Session,
    /// Ordered legacy-message history.
    pub messages: Vec<LegacyMessage>,
}

/// Directory-backed store of [`Session`] records (§4.H). Owns the
/// current-session pointer and enforces the single-writer-per-session
/// invariant by serializing all writes through `&mut self`.
pub struct SessionStore {
    home: GgcodeHome,
    policy: RetentionPolicy,
}

impl SessionStore {
    /// Build a store rooted at `home`, ensuring its directory layout
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory can't be created.
    pub fn new(home: GgcodeHome, policy: RetentionPolicy) -> RuntimeResult<Self> {
        home.ensure()?;
        Ok(Self { home, policy })
    }

    fn mint_id() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn read_session(&self, id: &str) -> RuntimeResult<Session> {
        let path = self.home.session_file(id);
        let data = std::fs::read_to_string(&path).map_err(|_| RuntimeError::SessionNotFound(id.to_string()))?;
        serde_json::from_str(&data)
            .map_err(|source| RuntimeError::SessionCorrupt { path: path.display().to_string(), source })
    }

    fn write_session(&self, session: &Session) -> RuntimeResult<()> {
        let path = self.home.session_file(&session.id);
        let json = serde_json::to_string_pretty(session).map_err(|e| RuntimeError::SessionPersist {
            session_id: session.id.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|source| RuntimeError::SessionPersist { session_id: session.id.clone(), source })?;
        std::fs::rename(&tmp, &path)
            .map_err(|source| RuntimeError::SessionPersist { session_id: session.id.clone(), source })
    }

    fn read_history(&self, id: &str) -> RuntimeResult<Vec<LegacyMessage>> {
        let path = self.home.history_file(id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .map_err(|source| RuntimeError::SessionCorrupt { path: path.display().to_string(), source })
    }

    fn write_history(&self, id: &str, messages: &[LegacyMessage]) -> RuntimeResult<()> {
        let path = self.home.history_file(id);
        let json = serde_json::to_string_pretty(messages).map_err(|e| RuntimeError::SessionPersist {
            session_id: id.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| RuntimeError::SessionPersist { session_id: id.to_string(), source })?;
        std::fs::rename(&tmp, &path).map_err(|source| RuntimeError::SessionPersist { session_id: id.to_string(), source })
    }

    /// List every session record on disk, most-recently-active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory can't be read.
    pub fn list(&self) -> RuntimeResult<Vec<Session>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.home.sessions_dir())? {
            let entry = entry?;
            let path = entry.path();
            let is_session_file = path.extension().is_some_and(|e| e == "json")
                && !path.file_name().is_some_and(|n| n.to_string_lossy().ends_with("-history.json"));
            if !is_session_file {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            if let Ok(session) = serde_json::from_str::<Session>(&data) {
                out.push(session);
            }
        }
        out.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(out)
    }

    /// The current session id, if any is set (spec.md §3
    /// `CurrentSessionPointer`).
    ///
    /// # Errors
    ///
    /// Returns an error if the pointer file exists but can't be read.
    pub fn current_id(&self) -> RuntimeResult<Option<String>> {
        let path = self.home.current_session_path();
        if !path.exists() {
            return Ok(None);
        }
        let id = std::fs::read_to_string(&path)?.trim().to_string();
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(id))
    }

    fn set_current(&self, id: &str) -> RuntimeResult<()> {
        let path = self.home.current_session_path();
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, id)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Create a new session and make it current, evicting the
    /// least-recently-active session outside the `preserve_recent` set
    /// if `max_sessions` would be exceeded (spec.md §4.H).
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub fn create(&self, title: impl Into<String>, agent_type: impl Into<String>, parent_id: Option<String>) -> RuntimeResult<Session> {
        let existing = self.list()?;
        if existing.len() >= self.policy.max_sessions {
            self.evict_one(&existing)?;
        }
        let id = Self::mint_id();
        let session = Session::new(id, title, agent_type, parent_id);
        self.write_session(&session)?;
        self.write_history(&session.id, &[])?;
        self.set_current(&session.id)?;
        Ok(session)
    }

    fn evict_one(&self, existing: &[Session]) -> RuntimeResult<()> {
        let protected: BTreeSet<&str> =
            existing.iter().take(self.policy.preserve_recent).map(|s| s.id.as_str()).collect();
        if let Some(victim) = existing.iter().rev().find(|s| !protected.contains(s.id.as_str())) {
            self.delete(&victim.id)?;
        }
        Ok(())
    }

    /// Switch the current-session pointer to `id`, touching its
    /// `lastActiveAt`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if `id` doesn't exist, or a persistence
    /// error.
    pub fn switch(&self, id: &str) -> RuntimeResult<Session> {
        let mut session = self.read_session(id)?;
        session.touch();
        self.write_session(&session)?;
        self.set_current(id)?;
        Ok(session)
    }

    /// Delete a session's record and history. If it was current, falls
    /// back to the most-recently-active remaining session (or clears the
    /// pointer if none remain).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file removal fails (missing
    /// files are not an error).
    pub fn delete(&self, id: &str) -> RuntimeResult<()> {
        let was_current = self.current_id()?.as_deref() == Some(id);
        let session_path = self.home.session_file(id);
        let history_path = self.home.history_file(id);
        if session_path.exists() {
            std::fs::remove_file(&session_path)?;
        }
        if history_path.exists() {
            std::fs::remove_file(&history_path)?;
        }
        if was_current {
            let remaining = self.list()?;
            if let Some(next) = remaining.first() {
                self.set_current(&next.id)?;
            } else {
                let pointer = self.home.current_session_path();
                if pointer.exists() {
                    std::fs::remove_file(pointer)?;
                }
            }
        }
        Ok(())
    }

    /// Clone `source`'s metadata (new id, `parent_id = source`) and copy
    /// its history up to and including `message_index` (defaults to the
    /// full history). Title becomes `"<original> (fork #N)"`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if `source` doesn't exist, or a
    /// persistence error.
    pub fn fork(&self, source: &str, message_index: Option<usize>) -> RuntimeResult<Session> {
        let original = self.read_session(source)?;
        let history = self.read_history(source)?;
        let prefix_len = message_index.map_or(history.len(), |idx| (idx + 1).min(history.len()));
        let prefix = history[..prefix_len].to_vec();

        let fork_number = self.list()?.iter().filter(|s| s.parent_id.as_deref() == Some(source)).count() + 1;
        let id = Self::mint_id();
        let mut forked = Session::new(id, format!("{} (fork #{fork_number})", original.title), original.agent_type.clone(), Some(source.to_string()));
        forked.message_count = prefix.len();
        self.write_session(&forked)?;
        self.write_history(&forked.id, &prefix)?;
        Ok(forked)
    }

    /// Rename a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a persistence error.
    pub fn rename(&self, id: &str, new_title: impl Into<String>) -> RuntimeResult<Session> {
        let mut session = self.read_session(id)?;
        session.title = new_title.into();
        session.touch();
        self.write_session(&session)?;
        Ok(session)
    }

    /// Export a session as a combined info + messages blob.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or an I/O error.
    pub fn export(&self, id: &str) -> RuntimeResult<SessionExport> {
        let info = self.read_session(id)?;
        let messages = self.read_history(id)?;
        Ok(SessionExport { info, messages })
    }

    /// Import a session blob, minting a new id but preserving timestamps
    /// and stats.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub fn import(&self, export: SessionExport) -> RuntimeResult<Session> {
        let id = Self::mint_id();
        let mut session = export.info;
        session.id = id;
        session.history_file = format!("{}-history.json", session.id);
        session.context_file = session.history_file.clone();
        self.write_session(&session)?;
        self.write_history(&session.id, &export.messages)?;
        Ok(session)
    }

    /// Persist `messages` as the session's history and bump its message
    /// count, without touching `lastActiveAt`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub fn save_history(&self, id: &str, messages: &[LegacyMessage]) -> RuntimeResult<()> {
        self.write_history(id, messages)?;
        let mut session = self.read_session(id)?;
        session.message_count = messages.len();
        session.updated_at = chrono::Utc::now();
        self.write_session(&session)
    }

    /// Load a session's history as enhanced (single-part) messages.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a corrupt-history error.
    pub fn load_history(&self, id: &str) -> RuntimeResult<Vec<EnhancedMessage>> {
        let legacy = self.read_history(id)?;
        Ok(legacy
            .into_iter()
            .enumerate()
            .map(|(i, m)| EnhancedMessage::text(m.role, format!("hist-{i}"), m.content))
            .collect())
    }

    /// Atomically fold code-change statistics into a session's summary
    /// (spec.md §4.H `updateSummary`).
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a persistence error.
    pub fn update_summary(&self, id: &str, additions: u64, deletions: u64, files: impl IntoIterator<Item = String>) -> RuntimeResult<()> {
        let mut session = self.read_session(id)?;
        let summary = session.summary.get_or_insert_with(Default::default);
        summary.apply(additions, deletions, files);
        self.write_session(&session)
    }

    /// Set a session's AI-generated title (from the `title` functional
    /// subagent), leaving code-change stats untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a persistence error.
    pub fn set_title(&self, id: &str, title: impl Into<String>) -> RuntimeResult<()> {
        let mut session = self.read_session(id)?;
        session.title = title.into();
        self.write_session(&session)
    }

    /// Bump a session's turn/tool-call counters.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a persistence error.
    pub fn record_stats(&self, id: &str, user_delta: u64, assistant_delta: u64, tool_call_delta: u64) -> RuntimeResult<()> {
        let mut session = self.read_session(id)?;
        session.stats.user_messages += user_delta;
        session.stats.assistant_messages += assistant_delta;
        session.stats.tool_calls += tool_call_delta;
        self.write_session(&session)
    }

    /// Delete sessions older than `max_inactive_days` that aren't in the
    /// `preserve_recent` set and aren't the current session (spec.md
    /// §4.H `manualCleanup`/background timer).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a deletion fails.
    pub fn cleanup(&self) -> RuntimeResult<usize> {
        let existing = self.list()?;
        let current = self.current_id()?;
        let protected: BTreeSet<&str> =
            existing.iter().take(self.policy.preserve_recent).map(|s| s.id.as_str()).collect();
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.policy.max_inactive_days as i64);
        let mut removed = 0usize;
        for session in &existing {
            if protected.contains(session.id.as_str()) {
                continue;
            }
            if current.as_deref() == Some(session.id.as_str()) {
                continue;
            }
            if session.last_active_at < cutoff {
                self.delete(&session.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Path to the spool directory tool output truncation writes to.
    #[must_use]
    pub fn tool_output_dir(&self) -> PathBuf {
        self.home.tool_output_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        let store = SessionStore::new(home, RetentionPolicy::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_becomes_current() {
        let (_dir, store) = store();
        let session = store.create("untitled", "build", None).unwrap();
        assert_eq!(store.current_id().unwrap(), Some(session.id));
    }

    #[test]
    fn fork_preserves_prefix_and_sets_parent() {
        let (_dir, store) = store();
        let session = store.create("original", "build", None).unwrap();
        let messages: Vec<LegacyMessage> = (0..10).map(|i| LegacyMessage::new(Role::User, format!("msg{i}"))).collect();
        store.save_history(&session.id, &messages).unwrap();

        let forked = store.fork(&session.id, Some(5)).unwrap();
        assert_eq!(forked.parent_id, Some(session.id.clone()));
        let forked_history = store.load_history(&forked.id).unwrap();
        assert_eq!(forked_history.len(), 6);
        for (i, m) in forked_history.iter().enumerate() {
            assert_eq!(m.flatten().unwrap().content, format!("msg{i}"));
        }
    }

    #[test]
    fn fork_then_rename() {
        let (_dir, store) = store();
        let session = store.create("S", "build", None).unwrap();
        let messages: Vec<LegacyMessage> = (0..10).map(|i| LegacyMessage::new(Role::User, format!("m{i}"))).collect();
        store.save_history(&session.id, &messages).unwrap();
        let forked = store.fork(&session.id, Some(5)).unwrap();
        let renamed = store.rename(&forked.id, "experiment").unwrap();
        assert_eq!(renamed.title, "experiment");
        let all = store.list().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn delete_falls_back_to_most_recent() {
        let (_dir, store) = store();
        let a = store.create("a", "build", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = store.create("b", "build", None).unwrap();
        assert_eq!(store.current_id().unwrap(), Some(b.id.clone()));
        store.delete(&b.id).unwrap();
        assert_eq!(store.current_id().unwrap(), Some(a.id));
    }

    #[test]
    fn export_import_round_trips_with_new_id() {
        let (_dir, store) = store();
        let session = store.create("S", "build", None).unwrap();
        store.save_history(&session.id, &[LegacyMessage::new(Role::User, "hi")]).unwrap();
        let exported = store.export(&session.id).unwrap();
        let imported = store.import(exported).unwrap();
        assert_ne!(imported.id, session.id);
        assert_eq!(store.load_history(&imported.id).unwrap().len(), 1);
    }

    #[test]
    fn cleanup_respects_preserve_recent() {
        let (_dir, store) = store();
        let policy = RetentionPolicy { max_sessions: 100, max_inactive_days: 0, preserve_recent: 100 };
        let store = SessionStore::new(GgcodeHome::from_path(store.home.root().to_path_buf()), policy).unwrap();
        let _a = store.create("a", "build", None).unwrap();
        let removed = store.cleanup().unwrap();
        assert_eq!(removed, 0, "preserve_recent protects everything");
    }
}
