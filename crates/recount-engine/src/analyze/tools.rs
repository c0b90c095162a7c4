use std::collections::{HashMap, HashSet};

use recount_transcript::{
    FileCollection,
    schema::{AssistantContentBlock, TranscriptLine, UserContentBlock, UserMessageContent},
};
use recount_types::ToolsStats;

/// Per-tool success/error tallies and the total call count. Tool uses are
/// deduplicated by tool_use id so context replays never inflate counts, and
/// the embedded `totalToolUseCount` of an agent Task result is used only when
/// the agent's own file is absent (mirroring the tokens analyzer).
pub fn analyze_tools(fc: &FileCollection) -> ToolsStats {
    let mut stats = ToolsStats::default();
    let mut names_by_id: HashMap<String, String> = HashMap::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for file in fc.all_files() {
        for line in file.typed_lines() {
            let assistant = match line {
                TranscriptLine::Assistant(a) => a,
                _ => continue,
            };
            for block in &assistant.message.content {
                if let AssistantContentBlock::ToolUse { id, name, .. } = block {
                    names_by_id.insert(id.clone(), name.clone());
                    if seen_ids.insert(id.clone()) {
                        stats.total_calls += 1;
                    }
                }
            }
        }
    }

    for file in fc.all_files() {
        for line in file.typed_lines() {
            let user = match line {
                TranscriptLine::User(u) => u,
                _ => continue,
            };
            let blocks = match &user.message.content {
                UserMessageContent::Blocks(blocks) => blocks,
                _ => continue,
            };
            for block in blocks {
                if let UserContentBlock::ToolResult {
                    tool_use_id,
                    is_error,
                    ..
                } = block
                {
                    let name = names_by_id
                        .get(tool_use_id)
                        .map(String::as_str)
                        .unwrap_or("unknown");
                    let entry = stats.tools.entry(name.to_string()).or_default();
                    if *is_error {
                        entry.errors += 1;
                        stats.error_count += 1;
                    } else {
                        entry.success += 1;
                    }
                }
            }
        }
    }

    // Fallback count for agents whose sidechain file never synced
    for line in fc.main().typed_lines() {
        if let TranscriptLine::User(user) = line
            && let Some(result) = &user.tool_use_result
            && let Some(agent_id) = &result.agent_id
            && !fc.has_agent_file(agent_id)
        {
            stats.total_calls += result.total_tool_use_count.unwrap_or(0);
        }
    }

    stats
}
