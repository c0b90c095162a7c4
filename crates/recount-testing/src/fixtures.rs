//! Transcript fixture builder.
//!
//! Produces line-delimited JSON in the assistant-log wire format, one method
//! per record shape, so tests read as scripts of a session.

use serde_json::{Value, json};

#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    lines: Vec<String>,
    session_id: String,
}

impl TranscriptBuilder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            lines: Vec::new(),
            session_id: session_id.into(),
        }
    }

    pub fn push_value(&mut self, value: Value) -> &mut Self {
        self.lines.push(value.to_string());
        self
    }

    pub fn push_raw(&mut self, raw: impl Into<String>) -> &mut Self {
        self.lines.push(raw.into());
        self
    }

    pub fn user_prompt(&mut self, uuid: &str, ts: &str, text: &str) -> &mut Self {
        self.push_value(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "message": {"role": "user", "content": text}
        }))
    }

    /// A user prompt with no timestamp (interrupted sync, imported history).
    pub fn user_prompt_untimed(&mut self, uuid: &str, text: &str) -> &mut Self {
        self.push_value(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": self.session_id,
            "message": {"role": "user", "content": text}
        }))
    }

    pub fn tool_result(
        &mut self,
        uuid: &str,
        ts: &str,
        tool_use_id: &str,
        is_error: bool,
    ) -> &mut Self {
        self.push_value(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "message": {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": tool_use_id, "is_error": is_error}
            ]}
        }))
    }

    /// A Task result carrying embedded agent usage, as logged when a
    /// sub-agent finishes.
    #[allow(clippy::too_many_arguments)]
    pub fn agent_task_result(
        &mut self,
        uuid: &str,
        ts: &str,
        tool_use_id: &str,
        agent_id: &str,
        total_tool_use_count: u64,
        input_tokens: u64,
        output_tokens: u64,
    ) -> &mut Self {
        self.push_value(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "message": {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": tool_use_id, "is_error": false}
            ]},
            "toolUseResult": {
                "agentId": agent_id,
                "totalToolUseCount": total_tool_use_count,
                "totalTokens": input_tokens + output_tokens,
                "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens}
            }
        }))
    }

    pub fn skill_expansion(
        &mut self,
        uuid: &str,
        ts: &str,
        source_tool_use_id: &str,
        text: &str,
    ) -> &mut Self {
        self.push_value(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "isMeta": true,
            "sourceToolUseID": source_tool_use_id,
            "message": {"role": "user", "content": text}
        }))
    }

    /// One assistant line with arbitrary content blocks.
    #[allow(clippy::too_many_arguments)]
    pub fn assistant(
        &mut self,
        uuid: &str,
        ts: &str,
        message_id: &str,
        model: &str,
        content: Value,
        input_tokens: u64,
        output_tokens: u64,
    ) -> &mut Self {
        self.push_value(json!({
            "type": "assistant",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "message": {
                "id": message_id,
                "model": model,
                "content": content,
                "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens}
            }
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assistant_text(
        &mut self,
        uuid: &str,
        ts: &str,
        message_id: &str,
        model: &str,
        text: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> &mut Self {
        self.assistant(
            uuid,
            ts,
            message_id,
            model,
            json!([{"type": "text", "text": text}]),
            input_tokens,
            output_tokens,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assistant_tool_use(
        &mut self,
        uuid: &str,
        ts: &str,
        message_id: &str,
        model: &str,
        tool_use_id: &str,
        tool_name: &str,
        input: Value,
    ) -> &mut Self {
        self.assistant(
            uuid,
            ts,
            message_id,
            model,
            json!([{"type": "tool_use", "id": tool_use_id, "name": tool_name, "input": input}]),
            10,
            10,
        )
    }

    pub fn compact_boundary(
        &mut self,
        uuid: &str,
        ts: &str,
        trigger: &str,
        logical_parent_uuid: &str,
        pre_tokens: u64,
    ) -> &mut Self {
        self.push_value(json!({
            "type": "system",
            "subtype": "compact_boundary",
            "uuid": uuid,
            "sessionId": self.session_id,
            "timestamp": ts,
            "logicalParentUuid": logical_parent_uuid,
            "compactMetadata": {"trigger": trigger, "preTokens": pre_tokens}
        }))
    }

    pub fn build(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}
