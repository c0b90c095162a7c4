use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use recount_types::{
    AgentsSkillsStats, Cards, CodeActivityStats, ConversationStats, RedactionsStats, SessionStats,
    SmartRecap, StoredCard, TokensStats, ToolsStats, AGENTS_AND_SKILLS_CARD_VERSION,
    CODE_ACTIVITY_CARD_VERSION, CONVERSATION_CARD_VERSION, REDACTIONS_CARD_VERSION,
    SESSION_CARD_VERSION, SMART_RECAP_CARD_VERSION, TOKENS_CARD_VERSION, TOOLS_CARD_VERSION,
};

use crate::records::{decode_ts, encode_ts};
use crate::{Error, Result};

/// The seven analyzer payloads to persist for one session. `None` entries are
/// skipped, leaving any existing row untouched.
#[derive(Debug, Default)]
pub struct RegularCardsUpdate<'a> {
    pub tokens: Option<&'a TokensStats>,
    pub session: Option<&'a SessionStats>,
    pub tools: Option<&'a ToolsStats>,
    pub code_activity: Option<&'a CodeActivityStats>,
    pub conversation: Option<&'a ConversationStats>,
    pub agents_and_skills: Option<&'a AgentsSkillsStats>,
    pub redactions: Option<&'a RedactionsStats>,
}

/// Write the provided cards in one transaction. Every written row gets the
/// same `computed_at` and `up_to_line`, so one compute pass lands as one
/// consistent snapshot.
pub fn upsert_regular_cards(
    conn: &Connection,
    session_id: &str,
    update: &RegularCardsUpdate,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    if let Some(stats) = update.tokens {
        upsert_tokens(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.session {
        upsert_session(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.tools {
        upsert_tools(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.code_activity {
        upsert_code_activity(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.conversation {
        upsert_conversation(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.agents_and_skills {
        upsert_agents_and_skills(&tx, session_id, stats, up_to_line, now)?;
    }
    if let Some(stats) = update.redactions {
        upsert_redactions(&tx, session_id, stats, up_to_line, now)?;
    }

    tx.commit()?;
    Ok(())
}

pub fn upsert_tokens(
    conn: &Connection,
    session_id: &str,
    stats: &TokensStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_tokens (
            session_id, version, computed_at, up_to_line,
            input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
            estimated_cost)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            input_tokens = ?5, output_tokens = ?6,
            cache_creation_tokens = ?7, cache_read_tokens = ?8,
            estimated_cost = ?9
        "#,
        params![
            session_id,
            TOKENS_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.input_tokens as i64,
            stats.output_tokens as i64,
            stats.cache_creation_tokens as i64,
            stats.cache_read_tokens as i64,
            stats.estimated_cost.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_tokens(conn: &Connection, session_id: &str) -> Result<Option<StoredCard<TokensStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line,
               input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
               estimated_cost
        FROM session_card_tokens WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        },
    )
    .optional()?
    .map(|(version, computed_at, up_to_line, input, output, cache_create, cache_read, cost)| {
        Ok(StoredCard {
            version,
            computed_at: parse_ts(&computed_at)?,
            up_to_line,
            data: TokensStats {
                input_tokens: input as u64,
                output_tokens: output as u64,
                cache_creation_tokens: cache_create as u64,
                cache_read_tokens: cache_read as u64,
                estimated_cost: cost
                    .parse()
                    .map_err(|_| Error::Query(format!("malformed cost: {}", cost)))?,
            },
        })
    })
    .transpose()
}

pub fn upsert_session(
    conn: &Connection,
    session_id: &str,
    stats: &SessionStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_session (
            session_id, version, computed_at, up_to_line,
            total_messages, user_messages, assistant_messages,
            human_prompts, tool_results, text_responses, tool_calls, thinking_blocks,
            duration_ms, models_used, compaction_auto, compaction_manual,
            compaction_auto_avg_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            total_messages = ?5, user_messages = ?6, assistant_messages = ?7,
            human_prompts = ?8, tool_results = ?9, text_responses = ?10,
            tool_calls = ?11, thinking_blocks = ?12, duration_ms = ?13,
            models_used = ?14, compaction_auto = ?15, compaction_manual = ?16,
            compaction_auto_avg_ms = ?17
        "#,
        params![
            session_id,
            SESSION_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.total_messages as i64,
            stats.user_messages as i64,
            stats.assistant_messages as i64,
            stats.human_prompts as i64,
            stats.tool_results as i64,
            stats.text_responses as i64,
            stats.tool_calls as i64,
            stats.thinking_blocks as i64,
            stats.duration_ms,
            serde_json::to_string(&stats.models_used)?,
            stats.compaction_auto as i64,
            stats.compaction_manual as i64,
            stats.compaction_auto_avg_ms,
        ],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<SessionStats>>> {
    let row = conn
        .query_row(
            r#"
            SELECT version, computed_at, up_to_line,
                   total_messages, user_messages, assistant_messages,
                   human_prompts, tool_results, text_responses, tool_calls, thinking_blocks,
                   duration_ms, models_used, compaction_auto, compaction_manual,
                   compaction_auto_avg_ms
            FROM session_card_session WHERE session_id = ?1
            "#,
            [session_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    [
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, i64>(10)?,
                    ],
                    row.get::<_, Option<i64>>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, i64>(13)?,
                    row.get::<_, i64>(14)?,
                    row.get::<_, Option<i64>>(15)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(version, computed_at, up_to_line, counts, duration, models, auto, manual, avg)| {
            Ok(StoredCard {
                version,
                computed_at: parse_ts(&computed_at)?,
                up_to_line,
                data: SessionStats {
                    total_messages: counts[0] as u64,
                    user_messages: counts[1] as u64,
                    assistant_messages: counts[2] as u64,
                    human_prompts: counts[3] as u64,
                    tool_results: counts[4] as u64,
                    text_responses: counts[5] as u64,
                    tool_calls: counts[6] as u64,
                    thinking_blocks: counts[7] as u64,
                    duration_ms: duration,
                    models_used: serde_json::from_str(&models)?,
                    compaction_auto: auto as u64,
                    compaction_manual: manual as u64,
                    compaction_auto_avg_ms: avg,
                },
            })
        },
    )
    .transpose()
}

pub fn upsert_tools(
    conn: &Connection,
    session_id: &str,
    stats: &ToolsStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_tools (
            session_id, version, computed_at, up_to_line,
            total_calls, error_count, tools)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            total_calls = ?5, error_count = ?6, tools = ?7
        "#,
        params![
            session_id,
            TOOLS_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.total_calls as i64,
            stats.error_count as i64,
            serde_json::to_string(&stats.tools)?,
        ],
    )?;
    Ok(())
}

pub fn get_tools(conn: &Connection, session_id: &str) -> Result<Option<StoredCard<ToolsStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line, total_calls, error_count, tools
        FROM session_card_tools WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    )
    .optional()?
    .map(|(version, computed_at, up_to_line, total, errors, tools)| {
        Ok(StoredCard {
            version,
            computed_at: parse_ts(&computed_at)?,
            up_to_line,
            data: ToolsStats {
                total_calls: total as u64,
                error_count: errors as u64,
                tools: serde_json::from_str(&tools)?,
            },
        })
    })
    .transpose()
}

pub fn upsert_code_activity(
    conn: &Connection,
    session_id: &str,
    stats: &CodeActivityStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_code_activity (
            session_id, version, computed_at, up_to_line,
            files_read, files_modified, lines_added, lines_removed,
            search_count, language_breakdown)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            files_read = ?5, files_modified = ?6, lines_added = ?7,
            lines_removed = ?8, search_count = ?9, language_breakdown = ?10
        "#,
        params![
            session_id,
            CODE_ACTIVITY_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.files_read as i64,
            stats.files_modified as i64,
            stats.lines_added as i64,
            stats.lines_removed as i64,
            stats.search_count as i64,
            serde_json::to_string(&stats.language_breakdown)?,
        ],
    )?;
    Ok(())
}

pub fn get_code_activity(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<CodeActivityStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line,
               files_read, files_modified, lines_added, lines_removed,
               search_count, language_breakdown
        FROM session_card_code_activity WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
            ))
        },
    )
    .optional()?
    .map(
        |(version, computed_at, up_to_line, read, modified, added, removed, search, langs)| {
            Ok(StoredCard {
                version,
                computed_at: parse_ts(&computed_at)?,
                up_to_line,
                data: CodeActivityStats {
                    files_read: read as u64,
                    files_modified: modified as u64,
                    lines_added: added as u64,
                    lines_removed: removed as u64,
                    search_count: search as u64,
                    language_breakdown: serde_json::from_str(&langs)?,
                },
            })
        },
    )
    .transpose()
}

pub fn upsert_conversation(
    conn: &Connection,
    session_id: &str,
    stats: &ConversationStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_conversation (
            session_id, version, computed_at, up_to_line,
            user_turns, assistant_turns, avg_assistant_turn_ms, avg_user_thinking_ms,
            total_assistant_ms, total_user_thinking_ms, assistant_utilization_pct)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            user_turns = ?5, assistant_turns = ?6,
            avg_assistant_turn_ms = ?7, avg_user_thinking_ms = ?8,
            total_assistant_ms = ?9, total_user_thinking_ms = ?10,
            assistant_utilization_pct = ?11
        "#,
        params![
            session_id,
            CONVERSATION_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.user_turns as i64,
            stats.assistant_turns as i64,
            stats.avg_assistant_turn_ms,
            stats.avg_user_thinking_ms,
            stats.total_assistant_ms,
            stats.total_user_thinking_ms,
            stats.assistant_utilization_pct,
        ],
    )?;
    Ok(())
}

pub fn get_conversation(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<ConversationStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line,
               user_turns, assistant_turns, avg_assistant_turn_ms, avg_user_thinking_ms,
               total_assistant_ms, total_user_thinking_ms, assistant_utilization_pct
        FROM session_card_conversation WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, Option<f64>>(9)?,
            ))
        },
    )
    .optional()?
    .map(
        |(version, computed_at, up_to_line, user, assistant, avg_a, avg_u, total_a, total_u, util)| {
            Ok(StoredCard {
                version,
                computed_at: parse_ts(&computed_at)?,
                up_to_line,
                data: ConversationStats {
                    user_turns: user as u64,
                    assistant_turns: assistant as u64,
                    avg_assistant_turn_ms: avg_a,
                    avg_user_thinking_ms: avg_u,
                    total_assistant_ms: total_a,
                    total_user_thinking_ms: total_u,
                    assistant_utilization_pct: util,
                },
            })
        },
    )
    .transpose()
}

pub fn upsert_agents_and_skills(
    conn: &Connection,
    session_id: &str,
    stats: &AgentsSkillsStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_agents_and_skills (
            session_id, version, computed_at, up_to_line,
            agent_invocations, skill_invocations, agents, skills)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            agent_invocations = ?5, skill_invocations = ?6,
            agents = ?7, skills = ?8
        "#,
        params![
            session_id,
            AGENTS_AND_SKILLS_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.agent_invocations as i64,
            stats.skill_invocations as i64,
            serde_json::to_string(&stats.agents)?,
            serde_json::to_string(&stats.skills)?,
        ],
    )?;
    Ok(())
}

pub fn get_agents_and_skills(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<AgentsSkillsStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line,
               agent_invocations, skill_invocations, agents, skills
        FROM session_card_agents_and_skills WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        },
    )
    .optional()?
    .map(
        |(version, computed_at, up_to_line, agents_n, skills_n, agents, skills)| {
            Ok(StoredCard {
                version,
                computed_at: parse_ts(&computed_at)?,
                up_to_line,
                data: AgentsSkillsStats {
                    agent_invocations: agents_n as u64,
                    skill_invocations: skills_n as u64,
                    agents: serde_json::from_str(&agents)?,
                    skills: serde_json::from_str(&skills)?,
                },
            })
        },
    )
    .transpose()
}

pub fn upsert_redactions(
    conn: &Connection,
    session_id: &str,
    stats: &RedactionsStats,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_redactions (
            session_id, version, computed_at, up_to_line, total_markers, categories)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            total_markers = ?5, categories = ?6
        "#,
        params![
            session_id,
            REDACTIONS_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            stats.total_markers as i64,
            serde_json::to_string(&stats.categories)?,
        ],
    )?;
    Ok(())
}

pub fn get_redactions(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<RedactionsStats>>> {
    conn.query_row(
        r#"
        SELECT version, computed_at, up_to_line, total_markers, categories
        FROM session_card_redactions WHERE session_id = ?1
        "#,
        [session_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    )
    .optional()?
    .map(|(version, computed_at, up_to_line, markers, categories)| {
        Ok(StoredCard {
            version,
            computed_at: parse_ts(&computed_at)?,
            up_to_line,
            data: RedactionsStats {
                total_markers: markers as u64,
                categories: serde_json::from_str(&categories)?,
            },
        })
    })
    .transpose()
}

/// Full card set for one session.
pub fn get_cards(conn: &Connection, session_id: &str) -> Result<Cards> {
    Ok(Cards {
        tokens: get_tokens(conn, session_id)?,
        session: get_session(conn, session_id)?,
        tools: get_tools(conn, session_id)?,
        code_activity: get_code_activity(conn, session_id)?,
        conversation: get_conversation(conn, session_id)?,
        agents_and_skills: get_agents_and_skills(conn, session_id)?,
        redactions: get_redactions(conn, session_id)?,
        smart_recap: get_smart_recap(conn, session_id)?,
        card_errors: Default::default(),
    })
}

// --- smart recap card and its advisory lock ---

/// Acquire the smart-recap advisory lock: a single compare-and-set that
/// stamps `computing_started_at` only when the slot is free or the previous
/// holder is older than `timeout_secs` (crashed or hung). A row is created on
/// first acquisition with a version-0 placeholder that never reads back as a
/// computed card.
pub fn acquire_smart_recap_lock(
    conn: &Connection,
    session_id: &str,
    timeout_secs: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let stale_cutoff = encode_ts(now - Duration::seconds(timeout_secs));
    let changed = conn.execute(
        r#"
        INSERT INTO session_card_smart_recap (
            session_id, version, computed_at, up_to_line, computing_started_at)
        VALUES (?1, 0, ?2, 0, ?2)
        ON CONFLICT(session_id) DO UPDATE SET
            computing_started_at = excluded.computing_started_at
        WHERE session_card_smart_recap.computing_started_at IS NULL
           OR session_card_smart_recap.computing_started_at < ?3
        "#,
        params![session_id, encode_ts(now), stale_cutoff],
    )?;
    Ok(changed > 0)
}

pub fn clear_smart_recap_lock(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE session_card_smart_recap SET computing_started_at = NULL WHERE session_id = ?1",
        [session_id],
    )?;
    Ok(())
}

/// Persist a generated recap. Clearing the lock is part of the same write, so
/// a successful generation atomically releases the slot.
pub fn upsert_smart_recap(
    conn: &Connection,
    session_id: &str,
    recap: &SmartRecap,
    up_to_line: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_card_smart_recap (
            session_id, version, computed_at, up_to_line,
            suggested_title, recap, went_well, went_bad,
            human_suggestions, environment_suggestions, default_context_suggestions,
            computing_started_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)
        ON CONFLICT(session_id) DO UPDATE SET
            version = ?2, computed_at = ?3, up_to_line = ?4,
            suggested_title = ?5, recap = ?6, went_well = ?7, went_bad = ?8,
            human_suggestions = ?9, environment_suggestions = ?10,
            default_context_suggestions = ?11, computing_started_at = NULL
        "#,
        params![
            session_id,
            SMART_RECAP_CARD_VERSION,
            encode_ts(now),
            up_to_line,
            recap.suggested_title,
            recap.recap,
            serde_json::to_string(&recap.went_well)?,
            serde_json::to_string(&recap.went_bad)?,
            serde_json::to_string(&recap.human_suggestions)?,
            serde_json::to_string(&recap.environment_suggestions)?,
            serde_json::to_string(&recap.default_context_suggestions)?,
        ],
    )?;
    Ok(())
}

pub fn get_smart_recap(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<StoredCard<SmartRecap>>> {
    let row = conn
        .query_row(
            r#"
            SELECT version, computed_at, up_to_line,
                   suggested_title, recap, went_well, went_bad,
                   human_suggestions, environment_suggestions, default_context_suggestions
            FROM session_card_smart_recap WHERE session_id = ?1
            "#,
            [session_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    [
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ],
                ))
            },
        )
        .optional()?;

    row.and_then(|(version, computed_at, up_to_line, title, recap, lists)| {
        if version == 0 {
            return None; // lock placeholder, not a computed card
        }
        Some((version, computed_at, up_to_line, title, recap, lists))
    })
    .map(|(version, computed_at, up_to_line, title, recap, lists)| {
        Ok(StoredCard {
            version,
            computed_at: parse_ts(&computed_at)?,
            up_to_line,
            data: SmartRecap {
                suggested_title: title,
                recap,
                went_well: serde_json::from_str(&lists[0])?,
                went_bad: serde_json::from_str(&lists[1])?,
                human_suggestions: serde_json::from_str(&lists[2])?,
                environment_suggestions: serde_json::from_str(&lists[3])?,
                default_context_suggestions: serde_json::from_str(&lists[4])?,
            },
        })
    })
    .transpose()
}

/// When the current lock holder started, if any.
pub fn get_smart_recap_lock(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<Option<String>> = conn
        .query_row(
            "SELECT computing_started_at FROM session_card_smart_recap WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.flatten().as_deref().and_then(decode_ts))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    decode_ts(raw).ok_or_else(|| Error::Query(format!("malformed timestamp: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use recount_types::{AnnotatedItem, ToolCallStats};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn tokens_card_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let stats = TokensStats {
            input_tokens: 300,
            output_tokens: 150,
            cache_creation_tokens: 10,
            cache_read_tokens: 20,
            estimated_cost: "0.0333".parse().unwrap(),
        };
        upsert_tokens(db.conn(), "s1", &stats, 42, now()).unwrap();

        let card = get_tokens(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(card.version, TOKENS_CARD_VERSION);
        assert_eq!(card.up_to_line, 42);
        assert_eq!(card.data, stats);
    }

    #[test]
    fn upsert_replaces_all_fields_together() {
        let db = Database::open_in_memory().unwrap();
        let mut stats = ToolsStats::default();
        stats.total_calls = 5;
        stats.tools.insert("Read".to_string(), ToolCallStats { success: 5, errors: 0 });
        upsert_tools(db.conn(), "s1", &stats, 10, now()).unwrap();

        stats.total_calls = 9;
        stats.tools.insert("Bash".to_string(), ToolCallStats { success: 3, errors: 1 });
        stats.error_count = 1;
        upsert_tools(db.conn(), "s1", &stats, 25, now()).unwrap();

        let card = get_tools(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(card.up_to_line, 25);
        assert_eq!(card.data.total_calls, 9);
        assert_eq!(card.data.tools.len(), 2);
    }

    #[test]
    fn regular_bundle_writes_one_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let tokens = TokensStats::default();
        let session = SessionStats::default();
        let update = RegularCardsUpdate {
            tokens: Some(&tokens),
            session: Some(&session),
            ..Default::default()
        };
        upsert_regular_cards(db.conn(), "s1", &update, 7, now()).unwrap();

        let cards = get_cards(db.conn(), "s1").unwrap();
        assert_eq!(cards.tokens.as_ref().unwrap().up_to_line, 7);
        assert_eq!(
            cards.tokens.unwrap().computed_at,
            cards.session.unwrap().computed_at
        );
        assert!(cards.tools.is_none());
    }

    #[test]
    fn lock_acquire_is_exclusive_until_cleared() {
        let db = Database::open_in_memory().unwrap();
        let t0 = now();
        assert!(acquire_smart_recap_lock(db.conn(), "s1", 60, t0).unwrap());
        // second acquire within the timeout fails
        assert!(!acquire_smart_recap_lock(db.conn(), "s1", 60, t0 + Duration::seconds(5)).unwrap());

        clear_smart_recap_lock(db.conn(), "s1").unwrap();
        assert!(acquire_smart_recap_lock(db.conn(), "s1", 60, t0 + Duration::seconds(6)).unwrap());
    }

    #[test]
    fn stale_lock_is_recoverable() {
        let db = Database::open_in_memory().unwrap();
        let t0 = now();
        assert!(acquire_smart_recap_lock(db.conn(), "s1", 60, t0).unwrap());
        // after the timeout window, the lock is considered abandoned
        assert!(
            acquire_smart_recap_lock(db.conn(), "s1", 60, t0 + Duration::seconds(61)).unwrap()
        );
    }

    #[test]
    fn lock_placeholder_is_not_a_card() {
        let db = Database::open_in_memory().unwrap();
        assert!(acquire_smart_recap_lock(db.conn(), "s1", 60, now()).unwrap());
        assert!(get_smart_recap(db.conn(), "s1").unwrap().is_none());
        assert!(get_smart_recap_lock(db.conn(), "s1").unwrap().is_some());
    }

    #[test]
    fn recap_upsert_clears_lock() {
        let db = Database::open_in_memory().unwrap();
        let t0 = now();
        assert!(acquire_smart_recap_lock(db.conn(), "s1", 60, t0).unwrap());

        let recap = SmartRecap {
            suggested_title: "Tidy the watcher".to_string(),
            recap: "Stabilized flaky tests.".to_string(),
            went_well: vec![AnnotatedItem::with_uuid("quick fix", "uuid-3")],
            ..Default::default()
        };
        upsert_smart_recap(db.conn(), "s1", &recap, 80, t0).unwrap();

        assert!(get_smart_recap_lock(db.conn(), "s1").unwrap().is_none());
        let card = get_smart_recap(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(card.version, SMART_RECAP_CARD_VERSION);
        assert_eq!(card.data.suggested_title, "Tidy the watcher");
        assert_eq!(card.data.went_well.len(), 1);
    }
}
