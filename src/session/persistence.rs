//! Disk I/O for sessions (spec §4.F): `sessions/index.json` plus one
//! `sessions/<id>.json` per session. Every write goes through
//! write-new-then-rename so a crash mid-write can never leave a half-written
//! file in place of the previous good one; corrupt reads surface as
//! `SessionCorruptedError` and leave the index untouched, matching the
//! teacher's `Config::load`/`Config::save` shape in `src/config/mod.rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{OpenmuxError, Result};
use crate::session::types::{Session, SessionIndex};

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn from_config() -> Result<Self> {
        let dir = Config::sessions_dir()
            .map_err(|e| OpenmuxError::SessionStorageError(PathBuf::new(), e.to_string()))?;
        Ok(Self::new(dir))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn load_index(&self) -> Result<SessionIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(SessionIndex::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| OpenmuxError::SessionStorageError(path.clone(), e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| OpenmuxError::SessionCorruptedError(path, e.to_string()))
    }

    pub fn save_index(&self, index: &SessionIndex) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(index).expect("SessionIndex serialization cannot fail");
        self.write_atomic(&self.index_path(), &contents)
    }

    pub fn load_session(&self, id: &str) -> Result<Session> {
        let path = self.session_path(id);
        let contents = fs::read_to_string(&path)
            .map_err(|e| OpenmuxError::SessionStorageError(path.clone(), e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| OpenmuxError::SessionCorruptedError(path, e.to_string()))
    }

    /// A session with zero panes is never written (spec §4.F): it would
    /// otherwise wipe a real session whenever the layout is transiently
    /// empty mid-load.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        if session.pane_count() == 0 {
            return Ok(());
        }
        let contents =
            serde_json::to_string_pretty(session).expect("Session serialization cannot fail");
        self.write_atomic(&self.session_path(&session.id), &contents)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let path = self.session_path(id);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| OpenmuxError::SessionStorageError(path, e.to_string()))?;
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| OpenmuxError::SessionStorageError(path.to_path_buf(), e.to_string()))?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .map_err(|e| OpenmuxError::SessionStorageError(path.to_path_buf(), e.to_string()))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| OpenmuxError::SessionStorageError(path.to_path_buf(), e.to_string()))?;
        Ok(())
    }
}

/// An opaque, URL-safe id with a timestamp-random suffix (spec §6). Built
/// from wall-clock nanoseconds and the process id rather than pulling in a
/// dedicated RNG crate purely for this.
pub fn generate_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("sess-{nanos:x}-{:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{Session, SessionMeta};
    use chrono::Utc;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    #[test]
    fn missing_index_loads_as_default() {
        let (_dir, store) = store();
        let index = store.load_index().unwrap();
        assert!(index.sessions.is_empty());
    }

    #[test]
    fn index_round_trips_through_atomic_write() {
        let (_dir, store) = store();
        let mut index = SessionIndex::default();
        index.upsert(SessionMeta {
            id: "s1".into(),
            name: "s1".into(),
            auto_named: true,
            created_at: Utc::now(),
            last_switched_at: Utc::now(),
        });
        store.save_index(&index).unwrap();

        let loaded = store.load_index().unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.sessions[0].id, "s1");
    }

    #[test]
    fn zero_pane_session_is_not_written() {
        let (_dir, store) = store();
        let session = Session::new("empty".into(), "empty".into(), true, Utc::now());
        store.save_session(&session).unwrap();
        assert!(store.load_session("empty").is_err());
    }

    #[test]
    fn corrupt_session_file_surfaces_typed_error() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path().join("sessions")).unwrap();
        fs::write(dir.path().join("sessions").join("bad.json"), b"not json").unwrap();
        match store.load_session("bad") {
            Err(OpenmuxError::SessionCorruptedError(_, _)) => {}
            other => panic!("expected SessionCorruptedError, got {other:?}"),
        }
    }

    #[test]
    fn deleting_a_missing_session_is_not_an_error() {
        let (_dir, store) = store();
        assert!(store.delete_session("nope").is_ok());
    }

    #[test]
    fn generated_session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("sess-"));
    }
}
