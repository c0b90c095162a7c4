use std::collections::{HashMap, HashSet};

use serde_json::Value;

use recount_transcript::{
    FileCollection,
    schema::{AssistantContentBlock, TranscriptLine, UserContentBlock, UserMessageContent},
};
use recount_types::AgentsSkillsStats;

enum Kind {
    Agent,
    Skill,
}

/// Sub-agent (`Task`) and skill (`Skill`) invocation stats, keyed by
/// `input.subagent_type` and `input.skill` respectively, with success/error
/// derived from the paired tool results.
pub fn analyze_agents_skills(fc: &FileCollection) -> AgentsSkillsStats {
    let mut stats = AgentsSkillsStats::default();
    let mut kind_by_id: HashMap<String, (Kind, String)> = HashMap::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for file in fc.all_files() {
        for line in file.typed_lines() {
            let assistant = match line {
                TranscriptLine::Assistant(a) => a,
                _ => continue,
            };
            for block in &assistant.message.content {
                let (id, name, input) = match block {
                    AssistantContentBlock::ToolUse { id, name, input } => (id, name, input),
                    _ => continue,
                };
                if !seen_ids.insert(id.clone()) {
                    continue;
                }

                match name.as_str() {
                    "Task" => {
                        let key = keyed(input, "subagent_type");
                        stats.agent_invocations += 1;
                        stats.agents.entry(key.clone()).or_default().count += 1;
                        kind_by_id.insert(id.clone(), (Kind::Agent, key));
                    }
                    "Skill" => {
                        let key = keyed(input, "skill");
                        stats.skill_invocations += 1;
                        stats.skills.entry(key.clone()).or_default().count += 1;
                        kind_by_id.insert(id.clone(), (Kind::Skill, key));
                    }
                    _ => {}
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
                let (tool_use_id, is_error) = match block {
                    UserContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                        ..
                    } => (tool_use_id, *is_error),
                    _ => continue,
                };
                let Some((kind, key)) = kind_by_id.get(tool_use_id) else {
                    continue;
                };
                let entry = match kind {
                    Kind::Agent => stats.agents.entry(key.clone()).or_default(),
                    Kind::Skill => stats.skills.entry(key.clone()).or_default(),
                };
                if is_error {
                    entry.errors += 1;
                } else {
                    entry.success += 1;
                }
            }
        }
    }

    stats
}

fn keyed(input: &Value, field: &str) -> String {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
