use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One transcript record, discriminated by its `type` field. Unknown types
/// decode as `Unknown` so new record kinds never break old readers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum TranscriptLine {
    #[serde(rename = "user")]
    User(UserLine),
    #[serde(rename = "assistant")]
    Assistant(AssistantLine),
    #[serde(rename = "system")]
    System(SystemLine),
    #[serde(rename = "file-history-snapshot")]
    FileHistorySnapshot(SnapshotLine),
    #[serde(rename = "summary")]
    Summary(SummaryLine),
    #[serde(rename = "queue-operation")]
    QueueOperation(QueueOperationLine),
    #[serde(rename = "pr-link")]
    PrLink(PrLinkLine),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLine {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub message: UserMessage,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub is_meta: bool,
    /// Tool-use id of the Skill invocation this line expands; together with
    /// `is_meta` it marks a skill expansion.
    #[serde(default, rename = "sourceToolUseID")]
    pub source_tool_use_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    /// Sub-agent Task result metadata (usage, tool-use count, agent id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_result: Option<ToolUseResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: UserMessageContent,
}

/// User content is either a plain prompt string (human message) or an array
/// of blocks (tool-result batch). The distinction is load-bearing for
/// classification, so both shapes are preserved as written.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserMessageContent {
    Text(String),
    Blocks(Vec<UserContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum UserContentBlock {
    Text {
        text: String,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// Sub-agent execution result attached to a tool-result user line. Observed
/// both as an object and as a bare string (error message), so it decodes
/// through a tolerant visitor; non-object shapes yield the empty result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolUseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ApiUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tool_use_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl<'de> Deserialize<'de> for ToolUseResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};
        use std::fmt;

        struct ToolUseResultVisitor;

        impl<'de> Visitor<'de> for ToolUseResultVisitor {
            type Value = ToolUseResult;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map or any value for ToolUseResult")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut result = ToolUseResult::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "agentId" => result.agent_id = map.next_value()?,
                        "usage" => result.usage = map.next_value()?,
                        "totalToolUseCount" => result.total_tool_use_count = map.next_value()?,
                        "totalTokens" => result.total_tokens = map.next_value()?,
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(result)
            }

            fn visit_str<E>(self, _: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ToolUseResult::default())
            }

            fn visit_string<E>(self, _: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ToolUseResult::default())
            }

            fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ToolUseResult::default())
            }
        }

        deserializer.deserialize_any(ToolUseResultVisitor)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantLine {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub message: AssistantMessage,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    /// API message id. One id may span several adjacent lines (one per
    /// streamed content block) and reappear later as a context replay.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<AssistantContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum AssistantContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// "fast" multiplies token cost; absent means standard speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_tool_use: Option<ServerToolUse>,
}

impl ApiUsage {
    pub fn is_fast(&self) -> bool {
        self.speed.as_deref() == Some("fast")
    }

    pub fn web_search_requests(&self) -> u64 {
        self.server_tool_use
            .as_ref()
            .map(|s| s.web_search_requests)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServerToolUse {
    #[serde(default)]
    pub web_search_requests: u64,
    #[serde(default)]
    pub web_fetch_requests: u64,
    #[serde(default)]
    pub code_execution_requests: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLine {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub subtype: String,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub content: Option<String>,
    /// Line the compaction logically descends from; auto-compaction latency
    /// is measured against its timestamp.
    #[serde(default)]
    pub logical_parent_uuid: Option<String>,
    #[serde(default)]
    pub compact_metadata: Option<CompactMetadata>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactMetadata {
    /// "auto" when the runtime compacted, "manual" when the user asked.
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub pre_tokens: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLine {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub snapshot: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryLine {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub leaf_uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOperationLine {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrLinkLine {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl TranscriptLine {
    /// A user line whose content is a plain string.
    pub fn is_human_message(&self) -> bool {
        matches!(
            self,
            TranscriptLine::User(u) if matches!(u.message.content, UserMessageContent::Text(_))
        )
    }

    /// A user line whose content is a block array (tool results).
    pub fn is_tool_result_message(&self) -> bool {
        matches!(
            self,
            TranscriptLine::User(u) if matches!(u.message.content, UserMessageContent::Blocks(_))
        )
    }

    /// An assistant line carrying usage, i.e. one that reflects an API call.
    pub fn is_assistant_message(&self) -> bool {
        matches!(self, TranscriptLine::Assistant(a) if a.message.usage.is_some())
    }

    /// A meta user line injected to expand a Skill invocation.
    pub fn is_skill_expansion_message(&self) -> bool {
        matches!(
            self,
            TranscriptLine::User(u)
                if u.is_meta && u.source_tool_use_id.as_deref().is_some_and(|id| !id.is_empty())
        )
    }

    pub fn is_compact_boundary(&self) -> bool {
        matches!(self, TranscriptLine::System(s) if s.subtype == "compact_boundary")
    }

    /// True when the line carries any text content. A plain-string user
    /// prompt counts as text.
    pub fn has_text_content(&self) -> bool {
        match self {
            TranscriptLine::User(u) => match &u.message.content {
                UserMessageContent::Text(_) => true,
                UserMessageContent::Blocks(blocks) => blocks
                    .iter()
                    .any(|b| matches!(b, UserContentBlock::Text { .. })),
            },
            TranscriptLine::Assistant(a) => a
                .message
                .content
                .iter()
                .any(|b| matches!(b, AssistantContentBlock::Text { .. })),
            _ => false,
        }
    }

    pub fn has_tool_use(&self) -> bool {
        matches!(
            self,
            TranscriptLine::Assistant(a)
                if a.message
                    .content
                    .iter()
                    .any(|b| matches!(b, AssistantContentBlock::ToolUse { .. }))
        )
    }

    pub fn has_thinking(&self) -> bool {
        matches!(
            self,
            TranscriptLine::Assistant(a)
                if a.message
                    .content
                    .iter()
                    .any(|b| matches!(b, AssistantContentBlock::Thinking { .. }))
        )
    }

    pub fn uuid(&self) -> Option<&str> {
        match self {
            TranscriptLine::User(u) => Some(&u.uuid),
            TranscriptLine::Assistant(a) => Some(&a.uuid),
            TranscriptLine::System(s) => s.uuid.as_deref(),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = match self {
            TranscriptLine::User(u) => u.timestamp.as_deref(),
            TranscriptLine::Assistant(a) => a.timestamp.as_deref(),
            TranscriptLine::System(s) => s.timestamp.as_deref(),
            TranscriptLine::FileHistorySnapshot(s) => s.timestamp.as_deref(),
            TranscriptLine::Summary(s) => s.timestamp.as_deref(),
            TranscriptLine::QueueOperation(q) => q.timestamp.as_deref(),
            TranscriptLine::PrLink(p) => p.timestamp.as_deref(),
            TranscriptLine::Unknown => None,
        };
        raw.and_then(parse_rfc3339)
    }

    /// Model id of an assistant line, when non-empty.
    pub fn model(&self) -> Option<&str> {
        match self {
            TranscriptLine::Assistant(a) if !a.message.model.is_empty() => {
                Some(a.message.model.as_str())
            }
            _ => None,
        }
    }
}
