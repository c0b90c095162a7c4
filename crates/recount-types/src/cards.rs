use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::recap::SmartRecap;

// Card versions. Bump when the card's schema or derivation changes; a stored
// card with a stale version is recomputed on the next scheduler pass.
pub const TOKENS_CARD_VERSION: i64 = 4;
pub const SESSION_CARD_VERSION: i64 = 3;
pub const TOOLS_CARD_VERSION: i64 = 2;
pub const CODE_ACTIVITY_CARD_VERSION: i64 = 2;
pub const CONVERSATION_CARD_VERSION: i64 = 3;
pub const AGENTS_AND_SKILLS_CARD_VERSION: i64 = 1;
pub const REDACTIONS_CARD_VERSION: i64 = 1;
pub const SMART_RECAP_CARD_VERSION: i64 = 2;

/// A persisted card: the analytic payload plus the validity metadata that
/// decides whether the cached row can still stand in for a recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCard<T> {
    pub version: i64,
    pub computed_at: DateTime<Utc>,
    /// Number of transcript lines reflected in this card (main + agents).
    pub up_to_line: i64,
    pub data: T,
}

impl<T> StoredCard<T> {
    pub fn is_valid(&self, current_version: i64, line_count: i64) -> bool {
        self.version == current_version && self.up_to_line == line_count
    }
}

/// Token totals summed over deduplicated assistant message groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokensStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    /// Estimated cost in USD. Decimal end to end; serialized as a string to
    /// keep binary-float drift out of storage.
    #[serde(with = "rust_decimal::serde::str")]
    pub estimated_cost: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_messages: u64,
    pub user_messages: u64,
    /// Deduplicated assistant message groups, not raw lines.
    pub assistant_messages: u64,
    pub human_prompts: u64,
    pub tool_results: u64,
    pub text_responses: u64,
    pub tool_calls: u64,
    pub thinking_blocks: u64,
    pub duration_ms: Option<i64>,
    pub models_used: Vec<String>,
    pub compaction_auto: u64,
    pub compaction_manual: u64,
    /// Average latency of auto compactions, from the logical parent line to
    /// the boundary line. Manual compactions are excluded.
    pub compaction_auto_avg_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallStats {
    pub success: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsStats {
    pub total_calls: u64,
    pub error_count: u64,
    pub tools: BTreeMap<String, ToolCallStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeActivityStats {
    pub files_read: u64,
    pub files_modified: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub search_count: u64,
    /// Extension histogram over read file paths, normalized (".go" -> "go").
    pub language_breakdown: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub user_turns: u64,
    pub assistant_turns: u64,
    pub avg_assistant_turn_ms: Option<i64>,
    pub avg_user_thinking_ms: Option<i64>,
    pub total_assistant_ms: i64,
    pub total_user_thinking_ms: i64,
    /// totalAssist / (totalAssist + totalUser) * 100, only when both totals
    /// are present.
    pub assistant_utilization_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStats {
    pub count: u64,
    pub success: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsSkillsStats {
    pub agent_invocations: u64,
    pub skill_invocations: u64,
    /// Keyed by `input.subagent_type` of the Task tool call.
    pub agents: BTreeMap<String, InvocationStats>,
    /// Keyed by `input.skill` of the Skill tool call.
    pub skills: BTreeMap<String, InvocationStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedactionsStats {
    pub total_markers: u64,
    pub categories: BTreeMap<String, u64>,
}

/// The full set of cards for one session, as read from the store. Any card may
/// be absent (never computed) or stale (version / line-count mismatch).
#[derive(Debug, Clone, Default)]
pub struct Cards {
    pub tokens: Option<StoredCard<TokensStats>>,
    pub session: Option<StoredCard<SessionStats>>,
    pub tools: Option<StoredCard<ToolsStats>>,
    pub code_activity: Option<StoredCard<CodeActivityStats>>,
    pub conversation: Option<StoredCard<ConversationStats>>,
    pub agents_and_skills: Option<StoredCard<AgentsSkillsStats>>,
    pub redactions: Option<StoredCard<RedactionsStats>>,
    pub smart_recap: Option<StoredCard<SmartRecap>>,
    /// Card-local failure messages, keyed by card name. A failed card never
    /// blocks the others from being computed or served.
    pub card_errors: BTreeMap<String, String>,
}

impl Cards {
    /// True iff all seven regular cards exist at their current version and
    /// reflect exactly `line_count` transcript lines. The smart recap is
    /// governed separately (time-based staleness plus an advisory lock), so it
    /// does not participate here.
    pub fn all_valid(&self, line_count: i64) -> bool {
        fn ok<T>(card: &Option<StoredCard<T>>, version: i64, line_count: i64) -> bool {
            card.as_ref()
                .map(|c| c.is_valid(version, line_count))
                .unwrap_or(false)
        }

        ok(&self.tokens, TOKENS_CARD_VERSION, line_count)
            && ok(&self.session, SESSION_CARD_VERSION, line_count)
            && ok(&self.tools, TOOLS_CARD_VERSION, line_count)
            && ok(&self.code_activity, CODE_ACTIVITY_CARD_VERSION, line_count)
            && ok(&self.conversation, CONVERSATION_CARD_VERSION, line_count)
            && ok(
                &self.agents_and_skills,
                AGENTS_AND_SKILLS_CARD_VERSION,
                line_count,
            )
            && ok(&self.redactions, REDACTIONS_CARD_VERSION, line_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card<T>(data: T, version: i64, up_to_line: i64) -> Option<StoredCard<T>> {
        Some(StoredCard {
            version,
            computed_at: Utc::now(),
            up_to_line,
            data,
        })
    }

    fn full_cards(up_to_line: i64) -> Cards {
        Cards {
            tokens: card(TokensStats::default(), TOKENS_CARD_VERSION, up_to_line),
            session: card(SessionStats::default(), SESSION_CARD_VERSION, up_to_line),
            tools: card(ToolsStats::default(), TOOLS_CARD_VERSION, up_to_line),
            code_activity: card(
                CodeActivityStats::default(),
                CODE_ACTIVITY_CARD_VERSION,
                up_to_line,
            ),
            conversation: card(
                ConversationStats::default(),
                CONVERSATION_CARD_VERSION,
                up_to_line,
            ),
            agents_and_skills: card(
                AgentsSkillsStats::default(),
                AGENTS_AND_SKILLS_CARD_VERSION,
                up_to_line,
            ),
            redactions: card(
                RedactionsStats::default(),
                REDACTIONS_CARD_VERSION,
                up_to_line,
            ),
            smart_recap: None,
            card_errors: BTreeMap::new(),
        }
    }

    #[test]
    fn all_valid_with_matching_versions_and_lines() {
        let cards = full_cards(42);
        assert!(cards.all_valid(42));
    }

    #[test]
    fn all_valid_rejects_line_count_mismatch() {
        let cards = full_cards(42);
        assert!(!cards.all_valid(43));
    }

    #[test]
    fn all_valid_rejects_missing_card() {
        let mut cards = full_cards(42);
        cards.redactions = None;
        assert!(!cards.all_valid(42));
    }

    #[test]
    fn all_valid_rejects_stale_version() {
        let mut cards = full_cards(42);
        cards.tokens.as_mut().unwrap().version = TOKENS_CARD_VERSION - 1;
        assert!(!cards.all_valid(42));
    }

    #[test]
    fn smart_recap_does_not_gate_validity() {
        let cards = full_cards(10);
        assert!(cards.smart_recap.is_none());
        assert!(cards.all_valid(10));
    }

    #[test]
    fn tokens_cost_round_trips_as_string() {
        let stats = TokensStats {
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            estimated_cost: Decimal::new(1575, 4), // 0.1575
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"0.1575\""));
        let back: TokensStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
