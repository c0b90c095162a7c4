use std::collections::HashMap;

use serde::Deserialize;

use recount_types::{AnnotatedItem, MessageRef, SmartRecap};

pub const TITLE_CHARS: usize = 100;
pub const WENT_WELL_CAP: usize = 3;
pub const WENT_BAD_CAP: usize = 3;
pub const HUMAN_SUGGESTIONS_CAP: usize = 2;
pub const ENVIRONMENT_SUGGESTIONS_CAP: usize = 2;
pub const DEFAULT_CONTEXT_SUGGESTIONS_CAP: usize = 2;

/// Model output as decoded from the raw completion, before caps and id
/// resolution are applied.
#[derive(Debug, Default, Deserialize)]
pub struct RawRecapResponse {
    #[serde(default)]
    pub suggested_session_title: String,
    #[serde(default)]
    pub recap: String,
    #[serde(default)]
    pub went_well: Vec<AnnotatedItem>,
    #[serde(default)]
    pub went_bad: Vec<AnnotatedItem>,
    #[serde(default)]
    pub human_suggestions: Vec<AnnotatedItem>,
    #[serde(default)]
    pub environment_suggestions: Vec<AnnotatedItem>,
    #[serde(default)]
    pub default_context_suggestions: Vec<AnnotatedItem>,
}

/// Slice out the outermost `{...}` of a completion. Models occasionally wrap
/// the JSON in prose or code fences; everything outside the braces is noise.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse a completion (with the `{` prefill already prepended) into the final
/// recap: caps applied, title bounded, and integer message ids resolved to
/// line uuids through the assembly map. Unresolvable references clear to the
/// empty state; item text is always preserved.
pub fn parse_recap_response(
    completion: &str,
    id_map: &HashMap<i64, String>,
) -> Result<SmartRecap, String> {
    let json = extract_json_object(completion)
        .ok_or_else(|| "no JSON object found in completion".to_string())?;
    let raw: RawRecapResponse =
        serde_json::from_str(json).map_err(|err| format!("malformed recap JSON: {}", err))?;

    Ok(SmartRecap {
        suggested_title: clamp_chars(&raw.suggested_session_title, TITLE_CHARS),
        recap: raw.recap,
        went_well: resolve_items(raw.went_well, WENT_WELL_CAP, id_map),
        went_bad: resolve_items(raw.went_bad, WENT_BAD_CAP, id_map),
        human_suggestions: resolve_items(raw.human_suggestions, HUMAN_SUGGESTIONS_CAP, id_map),
        environment_suggestions: resolve_items(
            raw.environment_suggestions,
            ENVIRONMENT_SUGGESTIONS_CAP,
            id_map,
        ),
        default_context_suggestions: resolve_items(
            raw.default_context_suggestions,
            DEFAULT_CONTEXT_SUGGESTIONS_CAP,
            id_map,
        ),
    })
}

fn clamp_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

fn resolve_items(
    items: Vec<AnnotatedItem>,
    cap: usize,
    id_map: &HashMap<i64, String>,
) -> Vec<AnnotatedItem> {
    items
        .into_iter()
        .take(cap)
        .map(|item| AnnotatedItem {
            message_ref: resolve_ref(item.message_ref, id_map),
            text: item.text,
        })
        .collect()
}

fn resolve_ref(reference: MessageRef, id_map: &HashMap<i64, String>) -> MessageRef {
    let index = match reference {
        MessageRef::None => return MessageRef::None,
        MessageRef::Index(idx) => idx,
        // a stringified integer still resolves; anything else is invalid
        MessageRef::Uuid(s) => match s.parse::<i64>() {
            Ok(idx) => idx,
            Err(_) => return MessageRef::None,
        },
    };
    match id_map.get(&index) {
        Some(uuid) => MessageRef::Uuid(uuid.clone()),
        None => MessageRef::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_map() -> HashMap<i64, String> {
        HashMap::from([(1, "uuid-1".to_string()), (2, "uuid-2".to_string())])
    }

    #[test]
    fn extracts_outermost_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json_object("Here you go:\n```json\n{\"a\": {\"b\": 2}}\n```"),
            Some(r#"{"a": {"b": 2}}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parses_and_resolves_ids() {
        let completion = r#"{
            "suggested_session_title": "Fix the flaky watcher test",
            "recap": "The session stabilized the watcher tests.",
            "went_well": [{"text": "quick diagnosis", "message_id": 2}],
            "went_bad": [{"text": "unanchored", "message_id": 99}],
            "human_suggestions": ["legacy shape"],
            "environment_suggestions": [],
            "default_context_suggestions": []
        }"#;
        let recap = parse_recap_response(completion, &id_map()).unwrap();
        assert_eq!(recap.suggested_title, "Fix the flaky watcher test");
        assert_eq!(
            recap.went_well[0].message_ref,
            MessageRef::Uuid("uuid-2".to_string())
        );
        // id 99 is not in the map: reference clears, text survives
        assert_eq!(recap.went_bad[0].message_ref, MessageRef::None);
        assert_eq!(recap.went_bad[0].text, "unanchored");
        assert_eq!(recap.human_suggestions[0].text, "legacy shape");
    }

    #[test]
    fn caps_are_enforced() {
        let completion = r#"{
            "suggested_session_title": "t",
            "recap": "r",
            "went_well": ["a", "b", "c", "d", "e"],
            "human_suggestions": ["a", "b", "c"]
        }"#;
        let recap = parse_recap_response(completion, &HashMap::new()).unwrap();
        assert_eq!(recap.went_well.len(), 3);
        assert_eq!(recap.human_suggestions.len(), 2);
        assert!(recap.environment_suggestions.is_empty());
    }

    #[test]
    fn title_is_clamped_to_100_chars() {
        let completion = format!(
            r#"{{"suggested_session_title": "{}", "recap": "r"}}"#,
            "T".repeat(140)
        );
        let recap = parse_recap_response(&completion, &HashMap::new()).unwrap();
        assert_eq!(recap.suggested_title.chars().count(), 100);
    }

    #[test]
    fn stringified_integer_id_resolves() {
        let completion = r#"{"recap": "r", "went_well": [{"text": "x", "message_id": "1"}]}"#;
        let recap = parse_recap_response(completion, &id_map()).unwrap();
        assert_eq!(
            recap.went_well[0].message_ref,
            MessageRef::Uuid("uuid-1".to_string())
        );
    }

    #[test]
    fn garbage_completion_is_an_error() {
        assert!(parse_recap_response("sorry, I cannot", &HashMap::new()).is_err());
        assert!(parse_recap_response("{not json}", &HashMap::new()).is_err());
    }
}
