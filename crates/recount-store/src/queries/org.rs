use std::collections::BTreeMap;

use rusqlite::{Connection, params};
use rust_decimal::Decimal;

use recount_types::OrgUserAnalytics;

use crate::{Error, Result};

/// Per-user organization analytics over `[start_ts, end_ts)`. A session
/// qualifies only when it has BOTH a tokens card and a conversation card;
/// inactive users are excluded, while active users with no qualifying
/// sessions appear with zero-valued fields.
pub fn org_analytics(
    conn: &Connection,
    start_ts: i64,
    end_ts: i64,
) -> Result<Vec<OrgUserAnalytics>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT u.id, u.email, u.name,
               s.id,
               t.estimated_cost, t.input_tokens, t.output_tokens,
               cv.user_turns, cv.assistant_utilization_pct,
               se.duration_ms
        FROM users u
        LEFT JOIN sessions s ON s.user_id = u.id
            AND s.status != 'deleted'
            AND CAST(strftime('%s', s.first_seen) AS INTEGER) >= ?1
            AND CAST(strftime('%s', s.first_seen) AS INTEGER) < ?2
        LEFT JOIN session_card_tokens t ON t.session_id = s.id
        LEFT JOIN session_card_conversation cv ON cv.session_id = s.id
        LEFT JOIN session_card_session se ON se.session_id = s.id
        WHERE u.status = 'active'
        ORDER BY u.id
        "#,
    )?;

    struct Accum {
        email: String,
        name: String,
        session_count: u64,
        cost: Decimal,
        tokens: u64,
        duration_sum: i64,
        duration_count: u64,
        utilization_sum: f64,
        utilization_count: u64,
    }

    let mut by_user: BTreeMap<String, Accum> = BTreeMap::new();

    let rows = stmt.query_map(params![start_ts, end_ts], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<i64>>(5)?,
            row.get::<_, Option<i64>>(6)?,
            row.get::<_, Option<i64>>(7)?,
            row.get::<_, Option<f64>>(8)?,
            row.get::<_, Option<i64>>(9)?,
        ))
    })?;

    for row in rows {
        let (user_id, email, name, session, cost, input, output, conv_witness, utilization, duration) =
            row?;
        let accum = by_user.entry(user_id).or_insert_with(|| Accum {
            email: email.unwrap_or_default(),
            name: name.unwrap_or_default(),
            session_count: 0,
            cost: Decimal::ZERO,
            tokens: 0,
            duration_sum: 0,
            duration_count: 0,
            utilization_sum: 0.0,
            utilization_count: 0,
        });

        // qualifying sessions carry both a tokens and a conversation card;
        // utilization stays nullable even when the conversation row exists,
        // so user_turns is the presence witness
        let (Some(_session_id), Some(cost), Some(_conv)) = (session, cost, conv_witness) else {
            continue;
        };

        accum.session_count += 1;
        accum.cost += cost
            .parse::<Decimal>()
            .map_err(|_| Error::Query(format!("malformed cost: {}", cost)))?;
        accum.tokens += (input.unwrap_or(0) + output.unwrap_or(0)) as u64;
        if let Some(duration) = duration {
            accum.duration_sum += duration;
            accum.duration_count += 1;
        }
        if let Some(utilization) = utilization {
            accum.utilization_sum += utilization;
            accum.utilization_count += 1;
        }
    }

    Ok(by_user
        .into_iter()
        .map(|(user_id, accum)| OrgUserAnalytics {
            user_id,
            email: accum.email,
            name: accum.name,
            session_count: accum.session_count,
            total_cost: format!("{:.2}", accum.cost),
            total_tokens: accum.tokens,
            avg_session_duration_ms: (accum.duration_count > 0)
                .then(|| accum.duration_sum / accum.duration_count as i64),
            avg_utilization_pct: (accum.utilization_count > 0)
                .then(|| accum.utilization_sum / accum.utilization_count as f64),
        })
        .collect())
}
