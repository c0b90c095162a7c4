use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, types::Value as SqlValue};
use rust_decimal::Decimal;

use recount_types::{DayActivity, DayCost, InvocationStats, ToolCallStats};

use crate::{Error, Result};

/// Shared window parameters for the trend aggregations. Epochs are UTC
/// seconds with `end_ts` exclusive; `tz_offset_minutes` follows the JS
/// `getTimezoneOffset` convention (UTC = local + offset), so the local date
/// of an epoch is `date(epoch - offset * 60)`.
#[derive(Debug, Clone, Copy)]
pub struct TrendsWindow {
    pub start_ts: i64,
    pub end_ts: i64,
    pub tz_offset_minutes: i64,
}

impl TrendsWindow {
    fn local_date(&self, epoch: i64) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(epoch - self.tz_offset_minutes * 60, 0)
            .map(|dt| dt.date_naive())
    }

    /// Every local calendar day covered by the half-open window.
    pub fn local_days(&self) -> Vec<NaiveDate> {
        let (first, last) = match (self.local_date(self.start_ts), self.local_date(self.end_ts - 1))
        {
            (Some(first), Some(last)) if self.start_ts < self.end_ts => (first, last),
            _ => return Vec::new(),
        };
        let mut days = Vec::new();
        let mut day = first;
        while day <= last {
            days.push(day);
            day = day + Duration::days(1);
        }
        days
    }
}

/// Per-day session/turn/duration series over the filtered sessions, with one
/// row for every local date in the window (zero-activity days included via a
/// recursive date CTE, the SQLite spelling of a day-series join).
pub fn activity_day_series(
    conn: &Connection,
    window: &TrendsWindow,
    session_ids: &[String],
) -> Result<Vec<DayActivity>> {
    if window.start_ts >= window.end_ts {
        return Ok(Vec::new());
    }

    let id_filter = in_clause("s.id", session_ids.len(), 3);
    let query = format!(
        r#"
        WITH RECURSIVE days(day) AS (
            SELECT date(?1 - ?3 * 60, 'unixepoch')
            UNION ALL
            SELECT date(day, '+1 day') FROM days
            WHERE day < date(?2 - 1 - ?3 * 60, 'unixepoch')
        )
        SELECT days.day,
               COUNT(s.id),
               COALESCE(SUM(cv.user_turns), 0),
               COALESCE(SUM(cv.assistant_turns), 0),
               COALESCE(SUM(se.duration_ms), 0),
               AVG(cv.assistant_utilization_pct)
        FROM days
        LEFT JOIN sessions s
            ON date(CAST(strftime('%s', s.first_seen) AS INTEGER) - ?3 * 60, 'unixepoch') = days.day
            AND {id_filter}
        LEFT JOIN session_card_conversation cv ON cv.session_id = s.id
        LEFT JOIN session_card_session se ON se.session_id = s.id
        GROUP BY days.day
        ORDER BY days.day
        "#,
    );

    let mut params: Vec<SqlValue> = vec![
        SqlValue::Integer(window.start_ts),
        SqlValue::Integer(window.end_ts),
        SqlValue::Integer(window.tz_offset_minutes),
    ];
    params.extend(session_ids.iter().map(|id| SqlValue::Text(id.clone())));

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(DayActivity {
                date: row.get(0)?,
                sessions: row.get::<_, i64>(1)? as u64,
                user_turns: row.get::<_, i64>(2)? as u64,
                assistant_turns: row.get::<_, i64>(3)? as u64,
                duration_ms: row.get(4)?,
                avg_utilization_pct: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Per-day token cost series. Costs are text decimals, so the summation runs
/// in Rust where precision survives; missing days are zero-filled.
pub fn token_day_series(
    conn: &Connection,
    window: &TrendsWindow,
    session_ids: &[String],
) -> Result<Vec<DayCost>> {
    let days = window.local_days();
    if days.is_empty() {
        return Ok(Vec::new());
    }

    struct DayAccum {
        cost: Decimal,
        input: u64,
        output: u64,
    }
    let mut by_day: BTreeMap<String, DayAccum> = days
        .iter()
        .map(|d| {
            (
                d.format("%Y-%m-%d").to_string(),
                DayAccum {
                    cost: Decimal::ZERO,
                    input: 0,
                    output: 0,
                },
            )
        })
        .collect();

    if !session_ids.is_empty() {
        let id_filter = in_clause("s.id", session_ids.len(), 1);
        let query = format!(
            r#"
            SELECT date(CAST(strftime('%s', s.first_seen) AS INTEGER) - ?1 * 60, 'unixepoch'),
                   t.estimated_cost, t.input_tokens, t.output_tokens
            FROM sessions s
            JOIN session_card_tokens t ON t.session_id = s.id
            WHERE {id_filter}
            "#,
        );

        let mut params: Vec<SqlValue> = vec![SqlValue::Integer(window.tz_offset_minutes)];
        params.extend(session_ids.iter().map(|id| SqlValue::Text(id.clone())));

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        for row in rows {
            let (day, cost, input, output) = row?;
            let Some(accum) = by_day.get_mut(&day) else {
                continue; // session outside the window's local days
            };
            accum.cost += cost
                .parse::<Decimal>()
                .map_err(|_| Error::Query(format!("malformed cost: {}", cost)))?;
            accum.input += input as u64;
            accum.output += output as u64;
        }
    }

    Ok(by_day
        .into_iter()
        .map(|(date, accum)| DayCost {
            date,
            cost: accum.cost.normalize().to_string(),
            input_tokens: accum.input,
            output_tokens: accum.output,
        })
        .collect())
}

/// Per-tool success/error sums over the filtered sessions, unpacked from the
/// JSON tool maps with `json_each`.
pub fn tool_totals(
    conn: &Connection,
    session_ids: &[String],
) -> Result<BTreeMap<String, ToolCallStats>> {
    if session_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let id_filter = in_clause("t.session_id", session_ids.len(), 0);
    let query = format!(
        r#"
        SELECT je.key,
               COALESCE(SUM(json_extract(je.value, '$.success')), 0),
               COALESCE(SUM(json_extract(je.value, '$.errors')), 0)
        FROM session_card_tools t, json_each(t.tools) je
        WHERE {id_filter}
        GROUP BY je.key
        "#,
    );

    let params: Vec<SqlValue> = session_ids
        .iter()
        .map(|id| SqlValue::Text(id.clone()))
        .collect();
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut totals = BTreeMap::new();
    for row in rows {
        let (name, success, errors) = row?;
        totals.insert(
            name,
            ToolCallStats {
                success: success as u64,
                errors: errors as u64,
            },
        );
    }
    Ok(totals)
}

/// Per-name agent and skill sums over the filtered sessions.
pub fn agent_skill_totals(
    conn: &Connection,
    session_ids: &[String],
) -> Result<(
    BTreeMap<String, InvocationStats>,
    BTreeMap<String, InvocationStats>,
)> {
    Ok((
        invocation_totals(conn, "agents", session_ids)?,
        invocation_totals(conn, "skills", session_ids)?,
    ))
}

fn invocation_totals(
    conn: &Connection,
    column: &str,
    session_ids: &[String],
) -> Result<BTreeMap<String, InvocationStats>> {
    if session_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let id_filter = in_clause("a.session_id", session_ids.len(), 0);
    let query = format!(
        r#"
        SELECT je.key,
               COALESCE(SUM(json_extract(je.value, '$.count')), 0),
               COALESCE(SUM(json_extract(je.value, '$.success')), 0),
               COALESCE(SUM(json_extract(je.value, '$.errors')), 0)
        FROM session_card_agents_and_skills a, json_each(a.{column}) je
        WHERE {id_filter}
        GROUP BY je.key
        "#,
    );

    let params: Vec<SqlValue> = session_ids
        .iter()
        .map(|id| SqlValue::Text(id.clone()))
        .collect();
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut totals = BTreeMap::new();
    for row in rows {
        let (name, count, success, errors) = row?;
        totals.insert(
            name,
            InvocationStats {
                count: count as u64,
                success: success as u64,
                errors: errors as u64,
            },
        );
    }
    Ok(totals)
}

/// `col IN (?k, ?k+1, ...)`, or a never-true predicate for an empty list.
fn in_clause(column: &str, count: usize, offset: usize) -> String {
    if count == 0 {
        return "1 = 0".to_string();
    }
    let placeholders: Vec<String> = (1..=count).map(|i| format!("?{}", offset + i)).collect();
    format!("{} IN ({})", column, placeholders.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_clause_numbering_respects_offset() {
        assert_eq!(in_clause("s.id", 2, 3), "s.id IN (?4, ?5)");
        assert_eq!(in_clause("s.id", 0, 3), "1 = 0");
    }

    #[test]
    fn local_days_cross_midnight_with_offset() {
        // 2025-03-01 23:30 UTC with offset -120 (UTC+2) is 2025-03-02 local
        let window = TrendsWindow {
            start_ts: 1_740_871_800, // 2025-03-01T23:30:00Z
            end_ts: 1_740_875_400,   // 2025-03-02T00:30:00Z
            tz_offset_minutes: -120,
        };
        let days: Vec<String> = window
            .local_days()
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        assert_eq!(days, vec!["2025-03-02"]);
    }

    #[test]
    fn local_days_span_multiple_dates() {
        let window = TrendsWindow {
            start_ts: 1_740_787_200, // 2025-03-01T00:00:00Z
            end_ts: 1_741_046_400,   // 2025-03-04T00:00:00Z (exclusive)
            tz_offset_minutes: 0,
        };
        let days = window.local_days();
        assert_eq!(days.len(), 3);
    }

    #[test]
    fn empty_window_yields_no_days() {
        let window = TrendsWindow {
            start_ts: 100,
            end_ts: 100,
            tz_offset_minutes: 0,
        };
        assert!(window.local_days().is_empty());
    }
}
