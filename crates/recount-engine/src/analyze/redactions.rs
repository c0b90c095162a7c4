use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use recount_transcript::FileCollection;
use recount_types::RedactionsStats;

/// Redaction markers as emitted upstream: `[REDACTED:API_KEY]` etc. The
/// category `TYPE` is the documentation placeholder and never counted.
static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[REDACTED:([A-Z][A-Z0-9_]*)\]").expect("marker regex"));

/// Count redaction markers across every string value of every line's raw
/// JSON, in all files. Object keys are not scanned, values are.
pub fn analyze_redactions(fc: &FileCollection) -> RedactionsStats {
    let mut stats = RedactionsStats::default();

    for file in fc.all_files() {
        for parsed in &file.lines {
            walk(&parsed.raw, &mut stats);
        }
    }

    stats
}

fn walk(value: &Value, stats: &mut RedactionsStats) {
    match value {
        Value::String(s) => {
            for capture in MARKER.captures_iter(s) {
                let category = &capture[1];
                if category == "TYPE" {
                    continue;
                }
                stats.total_markers += 1;
                *stats.categories.entry(category.to_string()).or_insert(0) += 1;
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, stats);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                walk(item, stats);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recount_transcript::TranscriptFile;

    #[test]
    fn counts_markers_in_nested_values() {
        let jsonl = r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"token=[REDACTED:API_KEY] and [REDACTED:EMAIL]"}]}]}}"#;
        let fc = FileCollection::new(TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap());
        let stats = analyze_redactions(&fc);
        assert_eq!(stats.total_markers, 2);
        assert_eq!(stats.categories.get("API_KEY"), Some(&1));
        assert_eq!(stats.categories.get("EMAIL"), Some(&1));
    }

    #[test]
    fn type_placeholder_is_filtered() {
        let jsonl = r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"docs say [REDACTED:TYPE] but saw [REDACTED:SSH_KEY]"}}"#;
        let fc = FileCollection::new(TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap());
        let stats = analyze_redactions(&fc);
        assert_eq!(stats.total_markers, 1);
        assert!(!stats.categories.contains_key("TYPE"));
    }

    #[test]
    fn lowercase_categories_do_not_match() {
        let jsonl = r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"[REDACTED:api_key]"}}"#;
        let fc = FileCollection::new(TranscriptFile::from_bytes(jsonl.as_bytes()).unwrap());
        let stats = analyze_redactions(&fc);
        assert_eq!(stats.total_markers, 0);
    }
}
