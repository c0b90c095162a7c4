use std::collections::HashSet;

use serde_json::Value;

use recount_transcript::{
    FileCollection,
    schema::{AssistantContentBlock, TranscriptLine},
};
use recount_types::CodeActivityStats;

/// File reads/writes, diff line counts, and search activity over all files.
/// Tool uses are deduplicated by id so replays don't double the diff math.
pub fn analyze_code_activity(fc: &FileCollection) -> CodeActivityStats {
    let mut stats = CodeActivityStats::default();
    let mut read_paths: HashSet<String> = HashSet::new();
    let mut modified_paths: HashSet<String> = HashSet::new();
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
                    "Read" => {
                        if let Some(path) = str_field(input, "file_path") {
                            if let Some(ext) = extension_of(path) {
                                *stats.language_breakdown.entry(ext).or_insert(0) += 1;
                            }
                            read_paths.insert(path.to_string());
                        }
                    }
                    "Write" => {
                        if let Some(path) = str_field(input, "file_path") {
                            modified_paths.insert(path.to_string());
                        }
                        stats.lines_added +=
                            count_lines(str_field(input, "content").unwrap_or(""));
                    }
                    "Edit" => {
                        if let Some(path) = str_field(input, "file_path") {
                            modified_paths.insert(path.to_string());
                        }
                        stats.lines_removed +=
                            count_lines(str_field(input, "old_string").unwrap_or(""));
                        stats.lines_added +=
                            count_lines(str_field(input, "new_string").unwrap_or(""));
                    }
                    "Glob" | "Grep" => {
                        stats.search_count += 1;
                    }
                    _ => {}
                }
            }
        }
    }

    stats.files_read = read_paths.len() as u64;
    stats.files_modified = modified_paths.len() as u64;
    stats
}

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// GitHub-style diff line counting: empty is zero lines; otherwise one
/// trailing newline is trimmed and the remaining newlines, plus one, count.
fn count_lines(content: &str) -> u64 {
    if content.is_empty() {
        return 0;
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    trimmed.matches('\n').count() as u64 + 1
}

/// Normalized lowercase extension of a file path (".go" -> "go"); None when
/// the file name has no extension.
fn extension_of(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_counting_matches_diff_semantics() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("one"), 1);
        assert_eq!(count_lines("one\n"), 1);
        assert_eq!(count_lines("one\ntwo"), 2);
        assert_eq!(count_lines("one\ntwo\n"), 2);
        assert_eq!(count_lines("\n"), 1);
    }

    #[test]
    fn extension_normalization() {
        assert_eq!(extension_of("/src/main.go"), Some("go".to_string()));
        assert_eq!(extension_of("/src/Mod.RS"), Some("rs".to_string()));
        assert_eq!(extension_of("/src/Makefile"), None);
    }
}
