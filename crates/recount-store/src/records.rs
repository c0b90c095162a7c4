use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical timestamp encoding for every stored TIMESTAMPTZ-shaped column.
/// Always UTC with a `Z` suffix and fixed fractional width, so lexicographic
/// comparison in SQL equals chronological comparison.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub external_id: String,
    pub session_type: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Raw git metadata JSON (`{"remote_url": ..., "branch": ...}`).
    pub git_info: Option<String>,
    pub suggested_session_title: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct SyncFileRecord {
    pub session_id: String,
    pub file_name: String,
    /// "transcript" for the main log, "agent" for sidechains.
    pub file_type: String,
    pub last_synced_line: i64,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct QuotaRecord {
    pub user_id: String,
    pub compute_count: i64,
    pub last_compute_at: Option<DateTime<Utc>>,
}

/// Identity of one regular card table. Shared by the staleness ranking and
/// the generic card metadata plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardKind {
    Tokens,
    Session,
    Tools,
    CodeActivity,
    Conversation,
    AgentsAndSkills,
    Redactions,
}

impl CardKind {
    pub const ALL: [CardKind; 7] = [
        CardKind::Tokens,
        CardKind::Session,
        CardKind::Tools,
        CardKind::CodeActivity,
        CardKind::Conversation,
        CardKind::AgentsAndSkills,
        CardKind::Redactions,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            CardKind::Tokens => "session_card_tokens",
            CardKind::Session => "session_card_session",
            CardKind::Tools => "session_card_tools",
            CardKind::CodeActivity => "session_card_code_activity",
            CardKind::Conversation => "session_card_conversation",
            CardKind::AgentsAndSkills => "session_card_agents_and_skills",
            CardKind::Redactions => "session_card_redactions",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CardKind::Tokens => "tokens",
            CardKind::Session => "session",
            CardKind::Tools => "tools",
            CardKind::CodeActivity => "code_activity",
            CardKind::Conversation => "conversation",
            CardKind::AgentsAndSkills => "agents_and_skills",
            CardKind::Redactions => "redactions",
        }
    }

    pub fn current_version(&self) -> i64 {
        match self {
            CardKind::Tokens => recount_types::TOKENS_CARD_VERSION,
            CardKind::Session => recount_types::SESSION_CARD_VERSION,
            CardKind::Tools => recount_types::TOOLS_CARD_VERSION,
            CardKind::CodeActivity => recount_types::CODE_ACTIVITY_CARD_VERSION,
            CardKind::Conversation => recount_types::CONVERSATION_CARD_VERSION,
            CardKind::AgentsAndSkills => recount_types::AGENTS_AND_SKILLS_CARD_VERSION,
            CardKind::Redactions => recount_types::REDACTIONS_CARD_VERSION,
        }
    }
}

/// Validity metadata of one stored card row.
#[derive(Debug, Clone, Copy)]
pub struct CardMeta {
    pub version: i64,
    pub computed_at: DateTime<Utc>,
    pub up_to_line: i64,
}
