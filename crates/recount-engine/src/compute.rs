use recount_transcript::{FileCollection, Result, TranscriptFile};
use recount_types::{
    AgentsSkillsStats, CodeActivityStats, ConversationStats, RedactionsStats, SessionStats,
    TokensStats, ToolsStats,
};

use crate::analyze;

/// Output of one full analyzer pass. All seven payloads derive from the same
/// FileCollection, so a card set written from one result is a consistent
/// snapshot at a single line count.
#[derive(Debug, Clone, Default)]
pub struct ComputeResult {
    pub tokens: TokensStats,
    pub session: SessionStats,
    pub tools: ToolsStats,
    pub code_activity: CodeActivityStats,
    pub conversation: ConversationStats,
    pub agents_and_skills: AgentsSkillsStats,
    pub redactions: RedactionsStats,
}

/// Run the seven analyzers over an assembled collection.
pub fn compute_from_file_collection(fc: &FileCollection) -> ComputeResult {
    ComputeResult {
        tokens: analyze::analyze_tokens(fc),
        session: analyze::analyze_session(fc),
        tools: analyze::analyze_tools(fc),
        code_activity: analyze::analyze_code_activity(fc),
        conversation: analyze::analyze_conversation(fc),
        agents_and_skills: analyze::analyze_agents_skills(fc),
        redactions: analyze::analyze_redactions(fc),
    }
}

/// Convenience entry for a single main transcript with no agent files. An
/// empty input yields the all-zero result.
pub fn compute_from_jsonl(bytes: &[u8]) -> Result<ComputeResult> {
    let fc = FileCollection::new(TranscriptFile::from_bytes(bytes)?);
    Ok(compute_from_file_collection(&fc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn empty_transcript_computes_all_zero() {
        let result = compute_from_jsonl(b"").unwrap();
        assert_eq!(result.tokens.input_tokens, 0);
        assert_eq!(result.tokens.estimated_cost, Decimal::ZERO);
        assert_eq!(result.tokens.estimated_cost.to_string(), "0");
        assert_eq!(result.session.total_messages, 0);
        assert_eq!(result.session.duration_ms, None);
        assert_eq!(result.tools.total_calls, 0);
        assert_eq!(result.conversation.user_turns, 0);
        assert_eq!(result.conversation.assistant_utilization_pct, None);
        assert_eq!(result.redactions.total_markers, 0);
    }

    #[test]
    fn blank_lines_only_is_still_empty() {
        let result = compute_from_jsonl(b"\n\n\n").unwrap();
        assert_eq!(result.session.total_messages, 0);
    }
}
