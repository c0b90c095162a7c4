use std::fmt;

use serde_json::Value;

/// Max characters of raw JSON echoed back in a validation error.
const SNIPPET_CHARS: usize = 200;

/// A single field-level schema violation, with the dotted/bracket path of the
/// offending value and precise expected/received type names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, received {}",
            self.path, self.expected, self.received
        )
    }
}

/// Validation failure for one transcript line. The line is excluded from the
/// typed list; processing of the file continues.
#[derive(Debug, Clone)]
pub struct LineValidationError {
    /// 1-indexed line number within its file.
    pub line: usize,
    /// Raw JSON, truncated to 200 characters.
    pub snippet: String,
    pub errors: Vec<FieldError>,
}

impl LineValidationError {
    pub fn new(line: usize, raw: &str, errors: Vec<FieldError>) -> Self {
        Self {
            line,
            snippet: truncate_snippet(raw),
            errors,
        }
    }

    pub fn invalid_json(line: usize, raw: &str, err: &serde_json::Error) -> Self {
        Self::new(
            line,
            raw,
            vec![FieldError {
                path: String::new(),
                expected: "valid JSON".to_string(),
                received: err.to_string(),
            }],
        )
    }
}

impl fmt::Display for LineValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

fn truncate_snippet(raw: &str) -> String {
    if raw.chars().count() <= SNIPPET_CHARS {
        raw.to_string()
    } else {
        raw.chars().take(SNIPPET_CHARS).collect()
    }
}

fn type_name(value: Option<&Value>) -> String {
    match value {
        None => "missing".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(_)) => "boolean".to_string(),
        Some(Value::Number(_)) => "number".to_string(),
        Some(Value::String(_)) => "string".to_string(),
        Some(Value::Array(_)) => "array".to_string(),
        Some(Value::Object(_)) => "object".to_string(),
    }
}

struct Checker<'a> {
    value: &'a Value,
    errors: Vec<FieldError>,
}

impl<'a> Checker<'a> {
    fn new(value: &'a Value) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, path: &str, expected: &str, got: Option<&Value>) {
        self.errors.push(FieldError {
            path: path.to_string(),
            expected: expected.to_string(),
            received: type_name(got),
        });
    }

    fn require_string(&mut self, path: &str) -> Option<&'a str> {
        let got = self.value.pointer(&pointer(path));
        match got {
            Some(Value::String(s)) => Some(s),
            other => {
                self.push(path, "string", other);
                None
            }
        }
    }

    fn optional_string(&mut self, path: &str) -> Option<&'a str> {
        match self.value.pointer(&pointer(path)) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            other => {
                self.push(path, "string", other);
                None
            }
        }
    }

    fn require_object(&mut self, path: &str) -> bool {
        let got = self.value.pointer(&pointer(path));
        match got {
            Some(Value::Object(_)) => true,
            other => {
                self.push(path, "object", other);
                false
            }
        }
    }

    fn optional_number(&mut self, path: &str) {
        match self.value.pointer(&pointer(path)) {
            None | Some(Value::Null) | Some(Value::Number(_)) => {}
            other => self.push(path, "number", other),
        }
    }

    fn check_timestamp(&mut self, path: &str) {
        if let Some(ts) = self.optional_string(path)
            && chrono::DateTime::parse_from_rfc3339(ts).is_err()
        {
            self.errors.push(FieldError {
                path: path.to_string(),
                expected: "RFC3339 timestamp".to_string(),
                received: format!("string {:?}", truncate_snippet(ts)),
            });
        }
    }
}

/// Convert a dotted/bracket path ("message.content[3].text") to a JSON
/// pointer ("/message/content/3/text").
fn pointer(path: &str) -> String {
    let mut out = String::new();
    for segment in path.split('.') {
        let mut rest = segment;
        while let Some(open) = rest.find('[') {
            let (name, tail) = rest.split_at(open);
            if !name.is_empty() {
                out.push('/');
                out.push_str(name);
            }
            let close = tail.find(']').unwrap_or(tail.len());
            out.push('/');
            out.push_str(&tail[1..close]);
            rest = &tail[(close + 1).min(tail.len())..];
        }
        if !rest.is_empty() {
            out.push('/');
            out.push_str(rest);
        }
    }
    out
}

/// Schema-validate one parsed line. Unknown `type` values validate OK
/// (forward compatibility), as do unknown content-block types inside known
/// messages. Returns the ordered list of field errors, empty when valid.
pub fn validate_line(value: &Value) -> Vec<FieldError> {
    let mut checker = Checker::new(value);

    if !value.is_object() {
        checker.push("", "object", Some(value));
        return checker.errors;
    }

    let line_type = match checker.require_string("type") {
        Some(t) => t.to_string(),
        None => return checker.errors,
    };

    match line_type.as_str() {
        "user" => validate_user(&mut checker),
        "assistant" => validate_assistant(&mut checker),
        "system" => validate_system(&mut checker),
        "file-history-snapshot" | "summary" | "queue-operation" | "pr-link" => {
            checker.check_timestamp("timestamp");
        }
        _ => {}
    }

    checker.errors
}

fn validate_envelope(checker: &mut Checker) {
    checker.require_string("uuid");
    checker.require_string("sessionId");
    checker.check_timestamp("timestamp");
}

fn validate_user(checker: &mut Checker) {
    validate_envelope(checker);
    if !checker.require_object("message") {
        return;
    }

    let content = checker.value.pointer("/message/content");
    match content {
        Some(Value::String(_)) => {}
        Some(Value::Array(blocks)) => {
            for (i, block) in blocks.iter().enumerate() {
                validate_user_block(checker, &format!("message.content[{}]", i), block);
            }
        }
        other => checker.push("message.content", "string or array", other),
    }
}

fn validate_user_block(checker: &mut Checker, path: &str, block: &Value) {
    let obj = match block.as_object() {
        Some(obj) => obj,
        None => {
            checker.push(path, "object", Some(block));
            return;
        }
    };

    let block_type = match obj.get("type") {
        Some(Value::String(t)) => t.as_str(),
        other => {
            checker.push(&format!("{}.type", path), "string", other);
            return;
        }
    };

    if block_type == "tool_result" {
        match obj.get("tool_use_id") {
            Some(Value::String(_)) => {}
            other => checker.push(&format!("{}.tool_use_id", path), "string", other),
        }
        // tool_result content may itself be a block array; recurse one level
        if let Some(Value::Array(nested)) = obj.get("content") {
            for (i, inner) in nested.iter().enumerate() {
                if !inner.is_object() && !inner.is_string() {
                    checker.push(
                        &format!("{}.content[{}]", path, i),
                        "object or string",
                        Some(inner),
                    );
                }
            }
        }
    }
}

fn validate_assistant(checker: &mut Checker) {
    validate_envelope(checker);
    if !checker.require_object("message") {
        return;
    }

    checker.optional_string("message.id");
    checker.optional_string("message.model");

    match checker.value.pointer("/message/content") {
        None => {}
        Some(Value::Array(blocks)) => {
            for (i, block) in blocks.iter().enumerate() {
                validate_assistant_block(checker, &format!("message.content[{}]", i), block);
            }
        }
        other => checker.push("message.content", "array", other),
    }

    match checker.value.pointer("/message/usage") {
        None | Some(Value::Null) => {}
        Some(Value::Object(_)) => {
            checker.optional_number("message.usage.input_tokens");
            checker.optional_number("message.usage.output_tokens");
            checker.optional_number("message.usage.cache_creation_input_tokens");
            checker.optional_number("message.usage.cache_read_input_tokens");
        }
        other => checker.push("message.usage", "object", other),
    }
}

fn validate_assistant_block(checker: &mut Checker, path: &str, block: &Value) {
    let obj = match block.as_object() {
        Some(obj) => obj,
        None => {
            checker.push(path, "object", Some(block));
            return;
        }
    };

    let block_type = match obj.get("type") {
        Some(Value::String(t)) => t.as_str(),
        other => {
            checker.push(&format!("{}.type", path), "string", other);
            return;
        }
    };

    match block_type {
        "text" => {
            if !matches!(obj.get("text"), Some(Value::String(_))) {
                checker.push(&format!("{}.text", path), "string", obj.get("text"));
            }
        }
        "thinking" => {
            if !matches!(obj.get("thinking"), Some(Value::String(_))) {
                checker.push(&format!("{}.thinking", path), "string", obj.get("thinking"));
            }
        }
        "tool_use" => {
            if !matches!(obj.get("id"), Some(Value::String(_))) {
                checker.push(&format!("{}.id", path), "string", obj.get("id"));
            }
            if !matches!(obj.get("name"), Some(Value::String(_))) {
                checker.push(&format!("{}.name", path), "string", obj.get("name"));
            }
            if obj.get("input").is_none() {
                checker.push(&format!("{}.input", path), "value", None);
            }
        }
        _ => {} // unknown block types validate OK
    }
}

fn validate_system(checker: &mut Checker) {
    checker.require_string("subtype");
    checker.check_timestamp("timestamp");

    let is_compact = checker.value.get("subtype").and_then(Value::as_str) == Some("compact_boundary");
    if is_compact {
        if checker.require_object("compactMetadata") {
            match checker.value.pointer("/compactMetadata/trigger") {
                Some(Value::String(_)) => {}
                other => checker.push("compactMetadata.trigger", "string", other),
            }
            checker.optional_number("compactMetadata.preTokens");
        }
        checker.optional_string("logicalParentUuid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_user_line_passes() {
        let value = json!({
            "type": "user",
            "uuid": "u1",
            "sessionId": "s1",
            "timestamp": "2025-03-01T10:00:00.123Z",
            "message": {"role": "user", "content": "hello"}
        });
        assert!(validate_line(&value).is_empty());
    }

    #[test]
    fn unknown_type_passes() {
        let value = json!({"type": "holo-deck", "anything": 1});
        assert!(validate_line(&value).is_empty());
    }

    #[test]
    fn missing_uuid_reports_expected_and_received() {
        let value = json!({
            "type": "user",
            "sessionId": "s1",
            "message": {"content": "x"}
        });
        let errors = validate_line(&value);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "uuid");
        assert_eq!(errors[0].expected, "string");
        assert_eq!(errors[0].received, "missing");
    }

    #[test]
    fn wrong_content_type_is_reported() {
        let value = json!({
            "type": "user",
            "uuid": "u1",
            "sessionId": "s1",
            "message": {"content": 42}
        });
        let errors = validate_line(&value);
        assert_eq!(errors[0].path, "message.content");
        assert_eq!(errors[0].expected, "string or array");
        assert_eq!(errors[0].received, "number");
    }

    #[test]
    fn tool_result_block_path_uses_bracket_notation() {
        let value = json!({
            "type": "user",
            "uuid": "u1",
            "sessionId": "s1",
            "message": {"content": [
                {"type": "text", "text": "x"},
                {"type": "tool_result", "tool_use_id": 9}
            ]}
        });
        let errors = validate_line(&value);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "message.content[1].tool_use_id");
        assert_eq!(errors[0].received, "number");
    }

    #[test]
    fn assistant_usage_token_types_checked() {
        let value = json!({
            "type": "assistant",
            "uuid": "a1",
            "sessionId": "s1",
            "message": {
                "id": "m1",
                "model": "claude-sonnet-4-5",
                "content": [],
                "usage": {"input_tokens": "ten", "output_tokens": 5}
            }
        });
        let errors = validate_line(&value);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "message.usage.input_tokens");
        assert_eq!(errors[0].expected, "number");
        assert_eq!(errors[0].received, "string");
    }

    #[test]
    fn unknown_assistant_block_passes() {
        let value = json!({
            "type": "assistant",
            "uuid": "a1",
            "sessionId": "s1",
            "message": {"content": [{"type": "sparkline", "data": [1, 2]}]}
        });
        assert!(validate_line(&value).is_empty());
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let value = json!({
            "type": "user",
            "uuid": "u1",
            "sessionId": "s1",
            "timestamp": "last tuesday",
            "message": {"content": "x"}
        });
        let errors = validate_line(&value);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "timestamp");
        assert_eq!(errors[0].expected, "RFC3339 timestamp");
    }

    #[test]
    fn compact_boundary_requires_metadata() {
        let value = json!({
            "type": "system",
            "subtype": "compact_boundary",
            "timestamp": "2025-03-01T10:00:00Z"
        });
        let errors = validate_line(&value);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "compactMetadata");
        assert_eq!(errors[0].expected, "object");
        assert_eq!(errors[0].received, "missing");
    }

    #[test]
    fn informational_system_line_passes() {
        let value = json!({
            "type": "system",
            "subtype": "turn_duration",
            "durationMs": 1234,
            "timestamp": "2025-03-01T10:00:00Z"
        });
        assert!(validate_line(&value).is_empty());
    }

    #[test]
    fn multiple_errors_are_ordered() {
        let value = json!({
            "type": "assistant",
            "message": {"content": "not an array"}
        });
        let errors = validate_line(&value);
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["uuid", "sessionId", "message.content"]);
    }

    #[test]
    fn snippet_is_truncated() {
        let long = format!("{{\"type\":\"user\",\"pad\":\"{}\"}}", "x".repeat(400));
        let err = LineValidationError::new(3, &long, vec![]);
        assert_eq!(err.snippet.chars().count(), 200);
        assert_eq!(err.line, 3);
    }
}
