use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::file::ParsedLine;
use crate::schema::{ApiUsage, TranscriptLine};

/// Assistant lines collapsed by `message.id`. One API response is streamed as
/// several adjacent lines (one per content block) and may be re-logged later
/// as a context replay; all occurrences fold into a single group.
///
/// Merge rules:
/// - content flags are OR-merged across occurrences
/// - `final_usage` comes from the last occurrence (output token counts grow
///   monotonically until then)
/// - `model` and `first_uuid` come from the first occurrence
/// - lines without a `message.id` become standalone groups in order
#[derive(Debug, Clone)]
pub struct AssistantMessageGroup {
    pub message_id: Option<String>,
    pub first_uuid: String,
    pub model: String,
    /// Timestamp of the first occurrence.
    pub timestamp: Option<DateTime<Utc>>,
    pub has_text: bool,
    pub has_tool_use: bool,
    pub has_thinking: bool,
    pub is_fast_mode: bool,
    pub final_usage: ApiUsage,
    pub occurrences: u32,
}

impl AssistantMessageGroup {
    /// Stable identity for turn bookkeeping: the message id when present,
    /// the first line's uuid otherwise.
    pub fn group_key(&self) -> &str {
        self.message_id.as_deref().unwrap_or(&self.first_uuid)
    }
}

pub(crate) fn build_groups(lines: &[ParsedLine]) -> Vec<AssistantMessageGroup> {
    let mut groups: Vec<AssistantMessageGroup> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for parsed in lines {
        let assistant = match &parsed.line {
            TranscriptLine::Assistant(a) => a,
            _ => continue,
        };

        let message_id = if assistant.message.id.is_empty() {
            None
        } else {
            Some(assistant.message.id.clone())
        };

        let existing = message_id
            .as_ref()
            .and_then(|id| index_by_id.get(id).copied());

        match existing {
            Some(idx) => merge_occurrence(&mut groups[idx], &parsed.line),
            None => {
                let group = new_group(message_id.clone(), &parsed.line, assistant);
                if let Some(id) = message_id {
                    index_by_id.insert(id, groups.len());
                }
                groups.push(group);
            }
        }
    }

    groups
}

fn new_group(
    message_id: Option<String>,
    line: &TranscriptLine,
    assistant: &crate::schema::AssistantLine,
) -> AssistantMessageGroup {
    let usage = assistant.message.usage.clone().unwrap_or_default();
    AssistantMessageGroup {
        message_id,
        first_uuid: assistant.uuid.clone(),
        model: assistant.message.model.clone(),
        timestamp: line.timestamp(),
        has_text: line.has_text_content(),
        has_tool_use: line.has_tool_use(),
        has_thinking: line.has_thinking(),
        is_fast_mode: usage.is_fast(),
        final_usage: usage,
        occurrences: 1,
    }
}

fn merge_occurrence(group: &mut AssistantMessageGroup, line: &TranscriptLine) {
    let assistant = match line {
        TranscriptLine::Assistant(a) => a,
        _ => return,
    };

    group.has_text |= line.has_text_content();
    group.has_tool_use |= line.has_tool_use();
    group.has_thinking |= line.has_thinking();
    if let Some(usage) = &assistant.message.usage {
        group.is_fast_mode |= usage.is_fast();
        group.final_usage = usage.clone();
    }
    group.occurrences += 1;
}

#[cfg(test)]
mod tests {
    use crate::file::TranscriptFile;

    fn assistant_line(uuid: &str, msg_id: &str, block: &str, output_tokens: u64) -> String {
        format!(
            r#"{{"type":"assistant","uuid":"{uuid}","sessionId":"s1",
                "timestamp":"2025-03-01T10:00:00Z",
                "message":{{"id":"{msg_id}","model":"claude-sonnet-4-5",
                    "content":[{block}],
                    "usage":{{"input_tokens":100,"output_tokens":{output_tokens}}}}}}}"#,
        )
        .replace('\n', " ")
    }

    #[test]
    fn streamed_blocks_collapse_into_one_group() {
        let jsonl = [
            assistant_line("a1", "msg-001", r#"{"type":"thinking","thinking":"t"}"#, 10),
            assistant_line("a2", "msg-001", r#"{"type":"text","text":"x"}"#, 50),
            assistant_line(
                "a3",
                "msg-001",
                r#"{"type":"tool_use","id":"tu1","name":"Read","input":{}}"#,
                80,
            ),
        ]
        .join("\n");

        let file = TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap();
        let groups = file.assistant_message_groups();
        assert_eq!(groups.len(), 1);

        let group = &groups[0];
        assert_eq!(group.message_id.as_deref(), Some("msg-001"));
        assert_eq!(group.first_uuid, "a1");
        assert!(group.has_text && group.has_tool_use && group.has_thinking);
        assert_eq!(group.final_usage.output_tokens, 80);
        assert_eq!(group.occurrences, 3);
    }

    #[test]
    fn context_replay_keeps_last_usage() {
        let jsonl = [
            assistant_line("a1", "msg-001", r#"{"type":"text","text":"x"}"#, 50),
            assistant_line("b1", "msg-002", r#"{"type":"text","text":"y"}"#, 20),
            // replay of msg-001 much later, with the final counts
            assistant_line("a9", "msg-001", r#"{"type":"text","text":"x"}"#, 80),
        ]
        .join("\n");

        let file = TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap();
        let groups = file.assistant_message_groups();
        assert_eq!(groups.len(), 2);
        // group order follows first occurrence
        assert_eq!(groups[0].message_id.as_deref(), Some("msg-001"));
        assert_eq!(groups[0].final_usage.output_tokens, 80);
        assert_eq!(groups[1].message_id.as_deref(), Some("msg-002"));
    }

    #[test]
    fn lines_without_message_id_stay_standalone() {
        let jsonl = [
            assistant_line("a1", "", r#"{"type":"text","text":"x"}"#, 10),
            assistant_line("a2", "", r#"{"type":"text","text":"y"}"#, 20),
        ]
        .join("\n");

        let file = TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap();
        let groups = file.assistant_message_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].message_id.is_none());
        assert_eq!(groups[0].group_key(), "a1");
        assert_eq!(groups[1].group_key(), "a2");
    }

    #[test]
    fn fast_mode_or_merges() {
        let normal = assistant_line("a1", "msg-1", r#"{"type":"text","text":"x"}"#, 10);
        let fast = r#"{"type":"assistant","uuid":"a2","sessionId":"s1","message":{"id":"msg-1","model":"claude-sonnet-4-5","content":[],"usage":{"input_tokens":1,"output_tokens":12,"speed":"fast"}}}"#;
        let jsonl = format!("{}\n{}", normal, fast);

        let file = TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap();
        let groups = file.assistant_message_groups();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_fast_mode);
        assert_eq!(groups[0].final_usage.output_tokens, 12);
    }
}
