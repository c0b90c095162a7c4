use std::collections::{HashMap, HashSet};

use serde_json::Value;

use recount_transcript::{
    FileCollection, TranscriptFile,
    schema::{AssistantContentBlock, TranscriptLine, UserContentBlock, UserMessageContent},
};

pub const SKILL_CONTENT_CHARS: usize = 1500;
pub const USER_CONTENT_CHARS: usize = 2000;
pub const THINKING_CHARS: usize = 2000;
pub const TEXT_CHARS: usize = 3000;
pub const TRUNCATION_SUFFIX: &str = "... [truncated]";
pub const OVERFLOW_NOTICE: &str = "[Transcript truncated due to length]";

/// Transcript rendered to the simplified XML fed to the model, plus the
/// id-attribute -> line-uuid mapping used to resolve the model's references
/// back to transcript lines.
#[derive(Debug)]
pub struct AssembledTranscript {
    pub xml: String,
    pub id_map: HashMap<i64, String>,
    pub truncated: bool,
}

/// Character-level truncation with the literal suffix. Limits are characters,
/// not tokens.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{}{}", kept, TRUNCATION_SUFFIX)
}

/// Render a collection to XML: main transcript first, then agent files, with
/// a monotone integer id per emitted element. `max_chars` bounds the whole
/// transcript portion; overflow is cut and flagged with a notice line.
pub fn assemble_transcript(fc: &FileCollection, max_chars: usize) -> AssembledTranscript {
    let tool_names = collect_tool_names(fc);
    let mut xml = String::new();
    let mut id_map = HashMap::new();
    let mut next_id: i64 = 1;

    for file in fc.all_files() {
        emit_file(file, &tool_names, &mut xml, &mut id_map, &mut next_id);
    }

    let truncated = xml.chars().count() > max_chars;
    if truncated {
        let mut kept: String = xml.chars().take(max_chars).collect();
        kept.push('\n');
        kept.push_str(OVERFLOW_NOTICE);
        xml = kept;
    }

    AssembledTranscript {
        xml,
        id_map,
        truncated,
    }
}

struct ToolNames {
    /// tool_use id -> tool name, for tool-result attribution.
    plain: HashMap<String, String>,
    /// tool_use id -> skill name (`input.skill`) when the tool was `Skill`.
    skill: HashMap<String, String>,
}

fn collect_tool_names(fc: &FileCollection) -> ToolNames {
    let mut names = ToolNames {
        plain: HashMap::new(),
        skill: HashMap::new(),
    };
    for file in fc.all_files() {
        for line in file.typed_lines() {
            let assistant = match line {
                TranscriptLine::Assistant(a) => a,
                _ => continue,
            };
            for block in &assistant.message.content {
                if let AssistantContentBlock::ToolUse { id, name, input } = block {
                    names.plain.insert(id.clone(), name.clone());
                    if name == "Skill"
                        && let Some(skill) = input.get("skill").and_then(Value::as_str)
                    {
                        names.skill.insert(id.clone(), skill.to_string());
                    }
                }
            }
        }
    }
    names
}

impl ToolNames {
    fn plain_name(&self, tool_use_id: &str) -> &str {
        self.plain
            .get(tool_use_id)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    /// Name shown on a skill expansion: the skill name for Skill tools,
    /// otherwise the raw tool name.
    fn skill_name(&self, tool_use_id: &str) -> &str {
        self.skill
            .get(tool_use_id)
            .map(String::as_str)
            .unwrap_or_else(|| self.plain_name(tool_use_id))
    }
}

/// Merged presentation content of one assistant message group. Streamed lines
/// carry one block each and replays repeat whole blocks, so text parts are
/// deduplicated by exact content and tools by tool_use id.
#[derive(Default)]
struct GroupContent {
    thinking: Option<String>,
    texts: Vec<String>,
    tool_calls: Vec<String>,
    seen_tool_ids: HashSet<String>,
}

fn emit_file(
    file: &TranscriptFile,
    tool_names: &ToolNames,
    xml: &mut String,
    id_map: &mut HashMap<i64, String>,
    next_id: &mut i64,
) {
    let mut content_by_group: HashMap<String, GroupContent> = HashMap::new();
    let mut group_order_uuid: HashMap<String, String> = HashMap::new();

    for line in file.typed_lines() {
        let assistant = match line {
            TranscriptLine::Assistant(a) => a,
            _ => continue,
        };
        let key = assistant_key(assistant);
        group_order_uuid
            .entry(key.clone())
            .or_insert_with(|| assistant.uuid.clone());
        let content = content_by_group.entry(key).or_default();
        for block in &assistant.message.content {
            match block {
                AssistantContentBlock::Thinking { thinking } => {
                    if content.thinking.is_none() && !thinking.is_empty() {
                        content.thinking = Some(thinking.clone());
                    }
                }
                AssistantContentBlock::Text { text } => {
                    if !text.is_empty() && !content.texts.iter().any(|t| t == text) {
                        content.texts.push(text.clone());
                    }
                }
                AssistantContentBlock::ToolUse { id, name, .. } => {
                    if content.seen_tool_ids.insert(id.clone()) {
                        content.tool_calls.push(name.clone());
                    }
                }
                AssistantContentBlock::Unknown => {}
            }
        }
    }

    let mut emitted_groups: HashSet<String> = HashSet::new();

    for line in file.typed_lines() {
        match line {
            TranscriptLine::User(user) => {
                if line.is_skill_expansion_message() {
                    let source = user.source_tool_use_id.as_deref().unwrap_or_default();
                    let name = tool_names.skill_name(source);
                    let body = truncate_chars(&user_text(user), SKILL_CONTENT_CHARS);
                    let id = assign_id(next_id, id_map, &user.uuid);
                    xml.push_str(&format!(
                        "<skill id=\"{}\" name=\"{}\">{}</skill>\n",
                        id, name, body
                    ));
                } else if line.is_human_message() {
                    let body = truncate_chars(&user_text(user), USER_CONTENT_CHARS);
                    let id = assign_id(next_id, id_map, &user.uuid);
                    xml.push_str(&format!("<user id=\"{}\">{}</user>\n", id, body));
                } else if let UserMessageContent::Blocks(blocks) = &user.message.content {
                    let results: Vec<(&str, bool)> = blocks
                        .iter()
                        .filter_map(|b| match b {
                            UserContentBlock::ToolResult {
                                tool_use_id,
                                is_error,
                                ..
                            } => Some((tool_use_id.as_str(), *is_error)),
                            _ => None,
                        })
                        .collect();
                    if results.is_empty() {
                        continue;
                    }
                    let id = assign_id(next_id, id_map, &user.uuid);
                    xml.push_str(&format!("<tool_results id=\"{}\">", id));
                    for (tool_use_id, is_error) in results {
                        let status = if is_error { "error" } else { "success" };
                        xml.push_str(&format!(
                            "<result tool=\"{}\" status=\"{}\"/>",
                            tool_names.plain_name(tool_use_id),
                            status
                        ));
                    }
                    xml.push_str("</tool_results>\n");
                }
            }
            TranscriptLine::Assistant(assistant) => {
                let key = assistant_key(assistant);
                if !emitted_groups.insert(key.clone()) {
                    continue;
                }
                let Some(content) = content_by_group.get(&key) else {
                    continue;
                };
                if content.thinking.is_none()
                    && content.texts.is_empty()
                    && content.tool_calls.is_empty()
                {
                    continue; // nothing to show, no id consumed
                }

                let uuid = group_order_uuid
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| assistant.uuid.clone());
                let id = assign_id(next_id, id_map, &uuid);
                xml.push_str(&format!("<assistant id=\"{}\">", id));
                if let Some(thinking) = &content.thinking {
                    xml.push_str(&format!(
                        "<thinking>{}</thinking>",
                        truncate_chars(thinking, THINKING_CHARS)
                    ));
                }
                if !content.texts.is_empty() {
                    let joined = content.texts.join("\n");
                    xml.push_str(&format!(
                        "<text>{}</text>",
                        truncate_chars(&joined, TEXT_CHARS)
                    ));
                }
                if !content.tool_calls.is_empty() {
                    xml.push_str(&format!(
                        "<tools_called>{}</tools_called>",
                        content.tool_calls.join(",")
                    ));
                }
                xml.push_str("</assistant>\n");
            }
            _ => {}
        }
    }
}

fn assistant_key(assistant: &recount_transcript::schema::AssistantLine) -> String {
    if assistant.message.id.is_empty() {
        assistant.uuid.clone()
    } else {
        assistant.message.id.clone()
    }
}

fn assign_id(next_id: &mut i64, id_map: &mut HashMap<i64, String>, uuid: &str) -> i64 {
    let id = *next_id;
    *next_id += 1;
    id_map.insert(id, uuid.to_string());
    id
}

fn user_text(user: &recount_transcript::schema::UserLine) -> String {
    match &user.message.content {
        UserMessageContent::Text(text) => text.clone(),
        UserMessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                UserContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
