use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use recount_types::SMART_RECAP_CARD_VERSION;

use crate::records::{CardKind, CardMeta, decode_ts};
use crate::{Error, Result};

/// Percentage-plus-floor staleness policy. A session recomputes when its line
/// gap or elapsed time outgrows the configured fraction of what the cards
/// already cover, with absolute floors so tiny sessions don't thrash.
#[derive(Debug, Clone, Copy)]
pub struct StalenessThresholds {
    pub threshold_pct: f64,
    pub base_min_lines: i64,
    pub base_min_secs: i64,
    /// A session with no cards yet is picked up once it has this many lines...
    pub min_initial_lines: i64,
    /// ...or once it is this old, whichever comes first.
    pub min_session_age_secs: i64,
}

impl StalenessThresholds {
    /// Defaults for the regular-cards bucket.
    pub fn regular() -> Self {
        Self {
            threshold_pct: 0.20,
            base_min_lines: 5,
            base_min_secs: 3 * 60,
            min_initial_lines: 10,
            min_session_age_secs: 10 * 60,
        }
    }

    /// Defaults for the smart-recap bucket. Higher floors: each recompute is
    /// an LLM call.
    pub fn smart_recap() -> Self {
        Self {
            threshold_pct: 0.20,
            base_min_lines: 50,
            base_min_secs: 15 * 60,
            min_initial_lines: 10,
            min_session_age_secs: 10 * 60,
        }
    }
}

/// Raw per-session card metadata as fetched in one pass; classification and
/// ordering happen in [`rank_regular`] / [`rank_smart_recap`].
#[derive(Debug, Clone)]
pub struct StaleCandidate {
    pub session_id: String,
    pub user_id: String,
    pub external_id: String,
    pub total_lines: i64,
    pub first_seen: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub cards: HashMap<CardKind, CardMeta>,
    /// Smart-recap row metadata; lock-only placeholder rows read as None.
    pub smart_recap: Option<CardMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StaleCategory {
    /// At least one card has never been computed.
    New = 1,
    /// All cards exist but at least one is from an older code version.
    VersionMismatch = 2,
    /// Cards are current but the transcript has grown past the threshold.
    ThresholdMet = 3,
}

#[derive(Debug, Clone)]
pub struct StaleSession {
    pub session_id: String,
    pub user_id: String,
    pub external_id: String,
    pub total_lines: i64,
    pub category: StaleCategory,
    pub line_gap: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Fetch card metadata for every live session in one query.
pub fn fetch_candidates(conn: &Connection) -> Result<Vec<StaleCandidate>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT s.id, s.user_id, s.external_id, s.first_seen, s.last_sync_at,
               (SELECT COALESCE(SUM(last_synced_line), 0)
                FROM sync_files f WHERE f.session_id = s.id) AS total_lines,
               t.version, t.computed_at, t.up_to_line,
               se.version, se.computed_at, se.up_to_line,
               tl.version, tl.computed_at, tl.up_to_line,
               ca.version, ca.computed_at, ca.up_to_line,
               cv.version, cv.computed_at, cv.up_to_line,
               ag.version, ag.computed_at, ag.up_to_line,
               re.version, re.computed_at, re.up_to_line,
               sr.version, sr.computed_at, sr.up_to_line
        FROM sessions s
        LEFT JOIN session_card_tokens t ON t.session_id = s.id
        LEFT JOIN session_card_session se ON se.session_id = s.id
        LEFT JOIN session_card_tools tl ON tl.session_id = s.id
        LEFT JOIN session_card_code_activity ca ON ca.session_id = s.id
        LEFT JOIN session_card_conversation cv ON cv.session_id = s.id
        LEFT JOIN session_card_agents_and_skills ag ON ag.session_id = s.id
        LEFT JOIN session_card_redactions re ON re.session_id = s.id
        LEFT JOIN session_card_smart_recap sr ON sr.session_id = s.id
        WHERE s.status != 'deleted'
        "#,
    )?;

    let rows = stmt.query_map([], |row| {
        let mut card_cols = Vec::with_capacity(8);
        for i in 0..8 {
            let base = 6 + i * 3;
            card_cols.push((
                row.get::<_, Option<i64>>(base)?,
                row.get::<_, Option<String>>(base + 1)?,
                row.get::<_, Option<i64>>(base + 2)?,
            ));
        }
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, i64>(5)?,
            card_cols,
        ))
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        let (session_id, user_id, external_id, first_seen, last_sync, total_lines, card_cols) =
            row?;

        let mut cards = HashMap::new();
        for (kind, cols) in CardKind::ALL.iter().zip(card_cols.iter()) {
            if let Some(meta) = meta_from_cols(cols)? {
                cards.insert(*kind, meta);
            }
        }
        let smart_recap = meta_from_cols(&card_cols[7])?.filter(|meta| meta.version != 0);

        candidates.push(StaleCandidate {
            first_seen: decode_ts(&first_seen)
                .ok_or_else(|| Error::Query(format!("malformed first_seen: {}", first_seen)))?,
            last_sync_at: last_sync.as_deref().and_then(decode_ts),
            session_id,
            user_id,
            external_id,
            total_lines,
            cards,
            smart_recap,
        });
    }

    Ok(candidates)
}

fn meta_from_cols(cols: &(Option<i64>, Option<String>, Option<i64>)) -> Result<Option<CardMeta>> {
    let (version, computed_at, up_to_line) = cols;
    match (version, computed_at, up_to_line) {
        (Some(version), Some(computed_at), Some(up_to_line)) => Ok(Some(CardMeta {
            version: *version,
            computed_at: decode_ts(computed_at)
                .ok_or_else(|| Error::Query(format!("malformed computed_at: {}", computed_at)))?,
            up_to_line: *up_to_line,
        })),
        _ => Ok(None),
    }
}

/// Rank sessions for the regular-cards bucket: category ascending, then line
/// gap descending, then most recently synced first.
pub fn rank_regular(
    candidates: &[StaleCandidate],
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<StaleSession> {
    let mut stale: Vec<StaleSession> = candidates
        .iter()
        .filter_map(|c| classify_regular(c, thresholds, now).map(|(category, gap)| to_stale(c, category, gap)))
        .collect();
    order_and_clip(&mut stale, limit);
    stale
}

/// Rank sessions for the smart-recap bucket. Only sessions whose seven
/// regular cards are fully valid participate; the same threshold algorithm
/// then runs against the recap row.
pub fn rank_smart_recap(
    candidates: &[StaleCandidate],
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<StaleSession> {
    let mut stale: Vec<StaleSession> = candidates
        .iter()
        .filter(|c| regular_cards_all_valid(c))
        .filter_map(|c| {
            classify_single(
                c.smart_recap.as_ref(),
                SMART_RECAP_CARD_VERSION,
                c,
                thresholds,
                now,
            )
            .map(|(category, gap)| to_stale(c, category, gap))
        })
        .collect();
    order_and_clip(&mut stale, limit);
    stale
}

fn to_stale(c: &StaleCandidate, category: StaleCategory, line_gap: i64) -> StaleSession {
    StaleSession {
        session_id: c.session_id.clone(),
        user_id: c.user_id.clone(),
        external_id: c.external_id.clone(),
        total_lines: c.total_lines,
        category,
        line_gap,
        last_sync_at: c.last_sync_at,
    }
}

fn order_and_clip(stale: &mut Vec<StaleSession>, limit: usize) {
    stale.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then(b.line_gap.cmp(&a.line_gap))
            .then(b.last_sync_at.cmp(&a.last_sync_at))
    });
    stale.truncate(limit);
}

fn regular_cards_all_valid(c: &StaleCandidate) -> bool {
    CardKind::ALL.iter().all(|kind| {
        c.cards
            .get(kind)
            .is_some_and(|meta| meta.version == kind.current_version() && meta.up_to_line == c.total_lines)
    })
}

fn classify_regular(
    c: &StaleCandidate,
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
) -> Option<(StaleCategory, i64)> {
    let missing = CardKind::ALL.iter().any(|kind| !c.cards.contains_key(kind));
    if missing {
        return new_session_eligible(c, thresholds, now).then_some((StaleCategory::New, c.total_lines));
    }

    let min_up = c.cards.values().map(|m| m.up_to_line).min().unwrap_or(0);
    let gap = c.total_lines - min_up;

    let mismatch = CardKind::ALL
        .iter()
        .any(|kind| c.cards.get(kind).is_some_and(|m| m.version != kind.current_version()));
    if mismatch {
        return Some((StaleCategory::VersionMismatch, gap));
    }

    let min_computed = c.cards.values().map(|m| m.computed_at).min()?;
    threshold_met(gap, min_up, min_computed, c.first_seen, thresholds, now)
        .then_some((StaleCategory::ThresholdMet, gap))
}

/// Classify against a single card row (the smart-recap variant of
/// [`classify_regular`]).
fn classify_single(
    meta: Option<&CardMeta>,
    current_version: i64,
    c: &StaleCandidate,
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
) -> Option<(StaleCategory, i64)> {
    let meta = match meta {
        None => {
            return new_session_eligible(c, thresholds, now)
                .then_some((StaleCategory::New, c.total_lines));
        }
        Some(meta) => meta,
    };

    let gap = c.total_lines - meta.up_to_line;
    if meta.version != current_version {
        return Some((StaleCategory::VersionMismatch, gap));
    }

    threshold_met(gap, meta.up_to_line, meta.computed_at, c.first_seen, thresholds, now)
        .then_some((StaleCategory::ThresholdMet, gap))
}

fn new_session_eligible(
    c: &StaleCandidate,
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
) -> bool {
    c.total_lines >= thresholds.min_initial_lines
        || (now - c.first_seen).num_seconds() >= thresholds.min_session_age_secs
}

fn threshold_met(
    gap: i64,
    covered_lines: i64,
    computed_at: DateTime<Utc>,
    first_seen: DateTime<Utc>,
    thresholds: &StalenessThresholds,
    now: DateTime<Utc>,
) -> bool {
    if gap <= 0 {
        return false;
    }

    let line_floor = (thresholds.base_min_lines as f64)
        .max(covered_lines as f64 * thresholds.threshold_pct);
    if gap as f64 >= line_floor {
        return true;
    }

    // time trigger: elapsed since compute, against a fraction of how long the
    // session had been running when the cards were computed
    let elapsed = (now - computed_at).num_seconds() as f64;
    let time_floor = (thresholds.base_min_secs as f64)
        .max((computed_at - first_seen).num_seconds() as f64 * thresholds.threshold_pct);
    elapsed >= time_floor
}
