//! Disposable end-to-end environment: a temp SQLite database plus a
//! filesystem blob layout matching what the scheduler expects.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use recount_store::{Database, SessionRecord, SyncFileRecord, UserRecord};

pub struct TestWorld {
    _dir: TempDir,
    pub db_path: PathBuf,
    pub blob_root: PathBuf,
}

impl TestWorld {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let db_path = dir.path().join("recount.db");
        let blob_root = dir.path().join("blobs");
        std::fs::create_dir_all(&blob_root)?;

        // initialize the schema up front
        Database::open(&db_path)?;

        Ok(Self {
            _dir: dir,
            db_path,
            blob_root,
        })
    }

    pub fn open_db(&self) -> Result<Database> {
        Ok(Database::open(&self.db_path)?)
    }

    pub fn seed_user(&self, user_id: &str) -> Result<()> {
        let db = self.open_db()?;
        db.insert_or_update_user(&UserRecord {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
            name: Some(user_id.to_string()),
            status: "active".to_string(),
        })?;
        Ok(())
    }

    /// Seed a session with its main transcript sync-file record.
    pub fn seed_session(
        &self,
        session_id: &str,
        user_id: &str,
        age_secs: i64,
        synced_lines: i64,
    ) -> Result<()> {
        let db = self.open_db()?;
        let now = Utc::now();
        db.insert_or_update_session(&SessionRecord {
            id: session_id.to_string(),
            user_id: user_id.to_string(),
            external_id: format!("ext-{}", session_id),
            session_type: Some("cli".to_string()),
            first_seen: now - Duration::seconds(age_secs),
            last_sync_at: Some(now),
            git_info: None,
            suggested_session_title: None,
            status: "active".to_string(),
        })?;
        db.insert_or_update_sync_file(&SyncFileRecord {
            session_id: session_id.to_string(),
            file_name: "transcript.jsonl".to_string(),
            file_type: "transcript".to_string(),
            last_synced_line: synced_lines,
        })?;
        Ok(())
    }

    pub fn seed_agent_file(
        &self,
        session_id: &str,
        file_name: &str,
        synced_lines: i64,
    ) -> Result<()> {
        let db = self.open_db()?;
        db.insert_or_update_sync_file(&SyncFileRecord {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            file_type: "agent".to_string(),
            last_synced_line: synced_lines,
        })?;
        Ok(())
    }

    /// Place merged transcript bytes where the filesystem blob store will
    /// find them.
    pub fn write_blob(
        &self,
        user_id: &str,
        external_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<()> {
        let dir = self.blob_root.join(user_id).join(external_id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(name), content)?;
        Ok(())
    }

    pub fn blob_root(&self) -> &Path {
        &self.blob_root
    }
}
