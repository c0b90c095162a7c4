use std::collections::HashMap;

use rust_decimal::Decimal;

use recount_transcript::{FileCollection, schema::TranscriptLine, schema::UserContentBlock};
use recount_types::TokensStats;

use crate::pricing::{pricing_for, total_cost};

/// Sum usage over deduplicated assistant message groups of every file, plus a
/// fallback for agent Task results whose sidechain file never synced. The
/// invariant: each logical API call is counted exactly once, across context
/// replays and agent attribution.
pub fn analyze_tokens(fc: &FileCollection) -> TokensStats {
    let mut stats = TokensStats::default();
    let mut cost = Decimal::ZERO;

    for file in fc.all_files() {
        for group in file.assistant_message_groups() {
            let usage = &group.final_usage;
            stats.input_tokens += usage.input_tokens;
            stats.output_tokens += usage.output_tokens;
            stats.cache_creation_tokens += usage.cache_creation_input_tokens;
            stats.cache_read_tokens += usage.cache_read_input_tokens;
            cost += total_cost(&pricing_for(&group.model), usage);
        }
    }

    // Task tool_use id -> model of the group that issued it, for pricing the
    // embedded fallback usage
    let mut models_by_tool_use: HashMap<&str, &str> = HashMap::new();
    for parsed in &fc.main().lines {
        if let TranscriptLine::Assistant(assistant) = &parsed.line {
            for block in &assistant.message.content {
                if let recount_transcript::schema::AssistantContentBlock::ToolUse { id, .. } = block
                {
                    models_by_tool_use.insert(id.as_str(), assistant.message.model.as_str());
                }
            }
        }
    }

    for parsed in &fc.main().lines {
        let user = match &parsed.line {
            TranscriptLine::User(u) => u,
            _ => continue,
        };
        let result = match &user.tool_use_result {
            Some(r) => r,
            None => continue,
        };
        let (agent_id, usage) = match (&result.agent_id, &result.usage) {
            (Some(agent_id), Some(usage)) => (agent_id, usage),
            _ => continue,
        };
        if fc.has_agent_file(agent_id) {
            continue; // the agent file is authoritative
        }

        stats.input_tokens += usage.input_tokens;
        stats.output_tokens += usage.output_tokens;
        stats.cache_creation_tokens += usage.cache_creation_input_tokens;
        stats.cache_read_tokens += usage.cache_read_input_tokens;

        let model = first_result_block_id(user)
            .and_then(|id| models_by_tool_use.get(id).copied())
            .unwrap_or("");
        cost += total_cost(&pricing_for(model), usage);
    }

    stats.estimated_cost = cost.normalize();
    stats
}

fn first_result_block_id(user: &recount_transcript::schema::UserLine) -> Option<&str> {
    match &user.message.content {
        recount_transcript::schema::UserMessageContent::Blocks(blocks) => {
            blocks.iter().find_map(|b| match b {
                UserContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
        }
        _ => None,
    }
}
