use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::records::UserRecord;

pub fn insert_or_update(conn: &Connection, user: &UserRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO users (id, email, name, status)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            email = COALESCE(?2, email),
            name = COALESCE(?3, name),
            status = ?4
        "#,
        params![&user.id, &user.email, &user.name, &user.status],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, user_id: &str) -> Result<Option<UserRecord>> {
    let user = conn
        .query_row(
            "SELECT id, email, name, status FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    status: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn list_active(conn: &Connection) -> Result<Vec<UserRecord>> {
    let mut stmt =
        conn.prepare("SELECT id, email, name, status FROM users WHERE status = 'active' ORDER BY id")?;
    let users = stmt
        .query_map([], |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                status: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(users)
}
