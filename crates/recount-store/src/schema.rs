use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 3;

// NOTE: Database Design Rationale
//
// Why one table per card instead of a single JSON blob table?
// - Card validity is a per-card decision: (version, up_to_line) pairs must be
//   comparable in SQL so the staleness query can rank sessions cheaply
// - Aggregations (trends, org analytics) read a handful of columns across
//   thousands of sessions; a blob table would force full deserialization
// - JSON stays where shape genuinely varies (tool maps, model lists)
//
// Why TEXT money?
// - Costs are computed in arbitrary-precision decimal and must round-trip
//   exactly; REAL columns would reintroduce binary-float drift
//
// Why an in-row advisory lock for smart recap?
// - The pending state is data: readers can see that a generation is running
//   and when it started, and a stale lock is recoverable by timestamp compare
//   without any table-level locking

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            session_type TEXT,
            first_seen TEXT NOT NULL,
            last_sync_at TEXT,
            git_info TEXT,
            suggested_session_title TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS sync_files (
            session_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            last_synced_line INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, file_name),
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT,
            name TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS smart_recap_quota (
            user_id TEXT PRIMARY KEY,
            compute_count INTEGER NOT NULL DEFAULT 0,
            last_compute_at TEXT
        );

        CREATE TABLE IF NOT EXISTS session_card_tokens (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cache_creation_tokens INTEGER NOT NULL,
            cache_read_tokens INTEGER NOT NULL,
            estimated_cost TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_card_session (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            total_messages INTEGER NOT NULL,
            user_messages INTEGER NOT NULL,
            assistant_messages INTEGER NOT NULL,
            human_prompts INTEGER NOT NULL,
            tool_results INTEGER NOT NULL,
            text_responses INTEGER NOT NULL,
            tool_calls INTEGER NOT NULL,
            thinking_blocks INTEGER NOT NULL,
            duration_ms INTEGER,
            models_used TEXT NOT NULL,
            compaction_auto INTEGER NOT NULL,
            compaction_manual INTEGER NOT NULL,
            compaction_auto_avg_ms INTEGER
        );

        CREATE TABLE IF NOT EXISTS session_card_tools (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            total_calls INTEGER NOT NULL,
            error_count INTEGER NOT NULL,
            tools TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_card_code_activity (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            files_read INTEGER NOT NULL,
            files_modified INTEGER NOT NULL,
            lines_added INTEGER NOT NULL,
            lines_removed INTEGER NOT NULL,
            search_count INTEGER NOT NULL,
            language_breakdown TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_card_conversation (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            user_turns INTEGER NOT NULL,
            assistant_turns INTEGER NOT NULL,
            avg_assistant_turn_ms INTEGER,
            avg_user_thinking_ms INTEGER,
            total_assistant_ms INTEGER NOT NULL,
            total_user_thinking_ms INTEGER NOT NULL,
            assistant_utilization_pct REAL
        );

        CREATE TABLE IF NOT EXISTS session_card_agents_and_skills (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            agent_invocations INTEGER NOT NULL,
            skill_invocations INTEGER NOT NULL,
            agents TEXT NOT NULL,
            skills TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_card_redactions (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            total_markers INTEGER NOT NULL,
            categories TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_card_smart_recap (
            session_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            computed_at TEXT NOT NULL,
            up_to_line INTEGER NOT NULL,
            suggested_title TEXT NOT NULL DEFAULT '',
            recap TEXT NOT NULL DEFAULT '',
            went_well TEXT NOT NULL DEFAULT '[]',
            went_bad TEXT NOT NULL DEFAULT '[]',
            human_suggestions TEXT NOT NULL DEFAULT '[]',
            environment_suggestions TEXT NOT NULL DEFAULT '[]',
            default_context_suggestions TEXT NOT NULL DEFAULT '[]',
            computing_started_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_first_seen ON sessions(first_seen);
        CREATE INDEX IF NOT EXISTS idx_sync_files_session ON sync_files(session_id);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS session_card_smart_recap;
        DROP TABLE IF EXISTS session_card_redactions;
        DROP TABLE IF EXISTS session_card_agents_and_skills;
        DROP TABLE IF EXISTS session_card_conversation;
        DROP TABLE IF EXISTS session_card_code_activity;
        DROP TABLE IF EXISTS session_card_tools;
        DROP TABLE IF EXISTS session_card_session;
        DROP TABLE IF EXISTS session_card_tokens;
        DROP TABLE IF EXISTS smart_recap_quota;
        DROP TABLE IF EXISTS users;
        DROP TABLE IF EXISTS sync_files;
        DROP TABLE IF EXISTS sessions;
        "#,
    )?;
    Ok(())
}
