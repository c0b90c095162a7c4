use rusqlite::{Connection, params};

use crate::Result;
use crate::records::SyncFileRecord;

pub fn insert_or_update(conn: &Connection, file: &SyncFileRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_files (session_id, file_name, file_type, last_synced_line)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(session_id, file_name) DO UPDATE SET
            file_type = ?3,
            last_synced_line = ?4
        "#,
        params![
            &file.session_id,
            &file.file_name,
            &file.file_type,
            file.last_synced_line
        ],
    )?;
    Ok(())
}

/// Files of one session, main transcript first, agents in name order after.
pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<SyncFileRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, file_name, file_type, last_synced_line
        FROM sync_files
        WHERE session_id = ?1
        ORDER BY CASE file_type WHEN 'transcript' THEN 0 ELSE 1 END, file_name
        "#,
    )?;

    let files = stmt
        .query_map([session_id], |row| {
            Ok(SyncFileRecord {
                session_id: row.get(0)?,
                file_name: row.get(1)?,
                file_type: row.get(2)?,
                last_synced_line: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(files)
}

/// Total synced lines across all of a session's files; the scheduler's
/// `total_lines` queue value and the `up_to_line` stamp for new cards.
pub fn total_lines(conn: &Connection, session_id: &str) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(last_synced_line), 0) FROM sync_files WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    Ok(total)
}
