use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use recount_types::{Cards, SmartRecap};

use crate::queries::cards::RegularCardsUpdate;
use crate::queries::staleness::{StaleCandidate, StaleSession, StalenessThresholds};
use crate::records::{QuotaRecord, SessionRecord, SyncFileRecord, UserRecord};
use crate::{Result, queries, schema};

/// Owning handle over one SQLite connection. Connections are cheap to open;
/// concurrent readers (the aggregation fan-out) each open their own.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        // concurrent readers during the aggregation fan-out
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    /// Raw connection, for query-module functions.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- sessions / users / sync files / quota ---

    pub fn insert_or_update_session(&self, session: &SessionRecord) -> Result<()> {
        queries::session::insert_or_update(&self.conn, session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        queries::session::get_by_id(&self.conn, session_id)
    }

    pub fn update_suggested_title(&self, session_id: &str, title: &str) -> Result<()> {
        queries::session::update_suggested_title(&self.conn, session_id, title)
    }

    pub fn insert_or_update_user(&self, user: &UserRecord) -> Result<()> {
        queries::user::insert_or_update(&self.conn, user)
    }

    pub fn insert_or_update_sync_file(&self, file: &SyncFileRecord) -> Result<()> {
        queries::sync_file::insert_or_update(&self.conn, file)
    }

    pub fn session_files(&self, session_id: &str) -> Result<Vec<SyncFileRecord>> {
        queries::sync_file::list_for_session(&self.conn, session_id)
    }

    pub fn session_total_lines(&self, session_id: &str) -> Result<i64> {
        queries::sync_file::total_lines(&self.conn, session_id)
    }

    pub fn increment_smart_recap_quota(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        queries::quota::increment(&self.conn, user_id, now)
    }

    pub fn smart_recap_quota(&self, user_id: &str) -> Result<Option<QuotaRecord>> {
        queries::quota::get(&self.conn, user_id)
    }

    // --- cards ---

    pub fn get_cards(&self, session_id: &str) -> Result<Cards> {
        queries::cards::get_cards(&self.conn, session_id)
    }

    pub fn upsert_regular_cards(
        &self,
        session_id: &str,
        update: &RegularCardsUpdate,
        up_to_line: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        queries::cards::upsert_regular_cards(&self.conn, session_id, update, up_to_line, now)
    }

    pub fn acquire_smart_recap_lock(
        &self,
        session_id: &str,
        timeout_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        queries::cards::acquire_smart_recap_lock(&self.conn, session_id, timeout_secs, now)
    }

    pub fn clear_smart_recap_lock(&self, session_id: &str) -> Result<()> {
        queries::cards::clear_smart_recap_lock(&self.conn, session_id)
    }

    pub fn upsert_smart_recap_card(
        &self,
        session_id: &str,
        recap: &SmartRecap,
        up_to_line: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        queries::cards::upsert_smart_recap(&self.conn, session_id, recap, up_to_line, now)
    }

    // --- staleness ---

    pub fn find_stale_sessions(
        &self,
        thresholds: &StalenessThresholds,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StaleSession>> {
        let candidates = queries::staleness::fetch_candidates(&self.conn)?;
        Ok(queries::staleness::rank_regular(
            &candidates,
            thresholds,
            now,
            limit,
        ))
    }

    pub fn find_stale_smart_recap_sessions(
        &self,
        thresholds: &StalenessThresholds,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StaleSession>> {
        let candidates = queries::staleness::fetch_candidates(&self.conn)?;
        Ok(queries::staleness::rank_smart_recap(
            &candidates,
            thresholds,
            now,
            limit,
        ))
    }

    pub fn stale_candidates(&self) -> Result<Vec<StaleCandidate>> {
        queries::staleness::fetch_candidates(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recount_types::{SessionStats, TokensStats};

    fn seed_session(db: &Database, id: &str, lines: i64, age_secs: i64) {
        let now = Utc::now();
        db.insert_or_update_session(&SessionRecord {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            external_id: format!("ext-{}", id),
            session_type: None,
            first_seen: now - chrono::Duration::seconds(age_secs),
            last_sync_at: Some(now),
            git_info: None,
            suggested_session_title: None,
            status: "active".to_string(),
        })
        .unwrap();
        db.insert_or_update_sync_file(&SyncFileRecord {
            session_id: id.to_string(),
            file_name: format!("{}.jsonl", id),
            file_type: "transcript".to_string(),
            last_synced_line: lines,
        })
        .unwrap();
    }

    #[test]
    fn stale_query_sees_seeded_sessions() {
        let db = Database::open_in_memory().unwrap();
        seed_session(&db, "s1", 50, 3600);

        let stale = db
            .find_stale_sessions(&StalenessThresholds::regular(), Utc::now(), 10)
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].session_id, "s1");
        assert_eq!(stale[0].total_lines, 50);
    }

    #[test]
    fn session_leaves_queue_once_cards_are_current() {
        let db = Database::open_in_memory().unwrap();
        seed_session(&db, "s1", 50, 3600);
        let now = Utc::now();

        // write all seven cards at the current line count
        let tokens = TokensStats::default();
        let session = SessionStats::default();
        let tools = Default::default();
        let code_activity = Default::default();
        let conversation = Default::default();
        let agents_and_skills = Default::default();
        let redactions = Default::default();
        let update = RegularCardsUpdate {
            tokens: Some(&tokens),
            session: Some(&session),
            tools: Some(&tools),
            code_activity: Some(&code_activity),
            conversation: Some(&conversation),
            agents_and_skills: Some(&agents_and_skills),
            redactions: Some(&redactions),
        };
        db.upsert_regular_cards("s1", &update, 50, now).unwrap();

        let stale = db
            .find_stale_sessions(&StalenessThresholds::regular(), now, 10)
            .unwrap();
        assert!(stale.is_empty());

        // and it becomes eligible for the recap bucket instead
        let recap_stale = db
            .find_stale_smart_recap_sessions(&StalenessThresholds::smart_recap(), now, 10)
            .unwrap();
        assert_eq!(recap_stale.len(), 1);
    }

    #[test]
    fn deleted_sessions_are_invisible() {
        let db = Database::open_in_memory().unwrap();
        seed_session(&db, "s1", 50, 3600);
        let mut record = db.get_session("s1").unwrap().unwrap();
        record.status = "deleted".to_string();
        db.insert_or_update_session(&record).unwrap();

        let stale = db
            .find_stale_sessions(&StalenessThresholds::regular(), Utc::now(), 10)
            .unwrap();
        assert!(stale.is_empty());
    }
}
