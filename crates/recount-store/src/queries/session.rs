use rusqlite::{Connection, OptionalExtension, params};

use crate::records::{SessionRecord, decode_ts, encode_ts};
use crate::{Error, Result};

pub fn insert_or_update(conn: &Connection, session: &SessionRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sessions (
            id, user_id, external_id, session_type, first_seen, last_sync_at,
            git_info, suggested_session_title, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            user_id = ?2,
            external_id = ?3,
            session_type = COALESCE(?4, session_type),
            last_sync_at = COALESCE(?6, last_sync_at),
            git_info = COALESCE(?7, git_info),
            suggested_session_title = COALESCE(?8, suggested_session_title),
            status = ?9
        "#,
        params![
            &session.id,
            &session.user_id,
            &session.external_id,
            &session.session_type,
            encode_ts(session.first_seen),
            session.last_sync_at.map(encode_ts),
            &session.git_info,
            &session.suggested_session_title,
            &session.status,
        ],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    conn.query_row(
        r#"
        SELECT id, user_id, external_id, session_type, first_seen, last_sync_at,
               git_info, suggested_session_title, status
        FROM sessions WHERE id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        },
    )
    .optional()?
    .map(
        |(id, user_id, external_id, session_type, first_seen, last_sync, git, title, status)| {
            Ok(SessionRecord {
                id,
                user_id,
                external_id,
                session_type,
                first_seen: decode_ts(&first_seen)
                    .ok_or_else(|| Error::Query(format!("malformed first_seen: {}", first_seen)))?,
                last_sync_at: last_sync.as_deref().and_then(decode_ts),
                git_info: git,
                suggested_session_title: title,
                status,
            })
        },
    )
    .transpose()
}

/// Update the LLM-suggested title. Sessions the user already renamed are left
/// alone upstream; this store-level call is unconditional.
pub fn update_suggested_title(conn: &Connection, session_id: &str, title: &str) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET suggested_session_title = ?2 WHERE id = ?1",
        params![session_id, title],
    )?;
    Ok(())
}

/// Sessions of one user in `[start_ts, end_ts)` by first-seen time, with
/// their git metadata for repo filtering. Deleted sessions are excluded.
pub fn list_for_user_in_range(
    conn: &Connection,
    user_id: &str,
    start_ts: i64,
    end_ts: i64,
) -> Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, git_info
        FROM sessions
        WHERE user_id = ?1
          AND status != 'deleted'
          AND CAST(strftime('%s', first_seen) AS INTEGER) >= ?2
          AND CAST(strftime('%s', first_seen) AS INTEGER) < ?3
        ORDER BY first_seen
        "#,
    )?;

    let rows = stmt
        .query_map(params![user_id, start_ts, end_ts], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}
