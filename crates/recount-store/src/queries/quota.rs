use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::records::{QuotaRecord, decode_ts, encode_ts};

/// Atomically bump a user's smart-recap compute count. Single upsert, so
/// concurrent generators never lose an increment. The count is a per-UTC-day
/// counter: a new day resets it to one.
pub fn increment(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO smart_recap_quota (user_id, compute_count, last_compute_at)
        VALUES (?1, 1, ?2)
        ON CONFLICT(user_id) DO UPDATE SET
            compute_count = CASE
                WHEN date(last_compute_at) = date(?2) THEN compute_count + 1
                ELSE 1
            END,
            last_compute_at = ?2
        "#,
        params![user_id, encode_ts(now)],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, user_id: &str) -> Result<Option<QuotaRecord>> {
    let row = conn
        .query_row(
            "SELECT user_id, compute_count, last_compute_at FROM smart_recap_quota WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(user_id, compute_count, last)| QuotaRecord {
        user_id,
        compute_count,
        last_compute_at: last.as_deref().and_then(decode_ts),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn increments_accumulate() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        increment(db.conn(), "user-1", now).unwrap();
        increment(db.conn(), "user-1", now).unwrap();
        increment(db.conn(), "user-2", now).unwrap();

        assert_eq!(get(db.conn(), "user-1").unwrap().unwrap().compute_count, 2);
        assert_eq!(get(db.conn(), "user-2").unwrap().unwrap().compute_count, 1);
        assert!(get(db.conn(), "user-3").unwrap().is_none());
    }

    #[test]
    fn count_resets_on_a_new_day() {
        let db = Database::open_in_memory().unwrap();
        let day_one = Utc::now();
        increment(db.conn(), "user-1", day_one).unwrap();
        increment(db.conn(), "user-1", day_one).unwrap();

        let day_two = day_one + chrono::Duration::days(1);
        increment(db.conn(), "user-1", day_two).unwrap();

        let quota = get(db.conn(), "user-1").unwrap().unwrap();
        assert_eq!(quota.compute_count, 1);
    }
}
