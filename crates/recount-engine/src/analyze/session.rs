use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use recount_transcript::{FileCollection, schema::TranscriptLine};
use recount_types::SessionStats;

/// Message counts, content breakdown, duration, models, and compaction
/// timing. Operates on the main transcript only, except for the models-used
/// set which also covers agents.
pub fn analyze_session(fc: &FileCollection) -> SessionStats {
    let mut stats = SessionStats::default();
    let main = fc.main();

    stats.total_messages = main.line_count() as u64;
    stats.assistant_messages = main.assistant_message_groups().len() as u64;

    // uuid -> timestamp over main lines, for compaction latency lookups
    let mut ts_by_uuid: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for parsed in &main.lines {
        if let (Some(uuid), Some(ts)) = (parsed.line.uuid(), parsed.line.timestamp()) {
            ts_by_uuid.insert(uuid, ts);
        }
    }

    let mut first_ts: Option<DateTime<Utc>> = None;
    let mut last_ts: Option<DateTime<Utc>> = None;
    let mut auto_latencies_ms: Vec<i64> = Vec::new();

    for parsed in &main.lines {
        let line = &parsed.line;

        if let Some(ts) = line.timestamp() {
            if first_ts.is_none() {
                first_ts = Some(ts);
            }
            last_ts = Some(ts);
        }

        match line {
            TranscriptLine::User(_) => {
                stats.user_messages += 1;
                if line.is_human_message() {
                    stats.human_prompts += 1;
                } else if line.is_tool_result_message() {
                    stats.tool_results += 1;
                }
            }
            TranscriptLine::System(sys) if line.is_compact_boundary() => {
                let trigger = sys
                    .compact_metadata
                    .as_ref()
                    .map(|m| m.trigger.as_str())
                    .unwrap_or("");
                if trigger == "manual" {
                    stats.compaction_manual += 1;
                } else {
                    stats.compaction_auto += 1;
                    // latency from the logical parent line; negatives dropped
                    if let (Some(parent), Some(ts)) = (&sys.logical_parent_uuid, line.timestamp())
                        && let Some(parent_ts) = ts_by_uuid.get(parent.as_str())
                    {
                        let delta = (ts - *parent_ts).num_milliseconds();
                        if delta >= 0 {
                            auto_latencies_ms.push(delta);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Content breakdown over deduplicated groups; categories overlap
    for group in main.assistant_message_groups() {
        if group.has_text {
            stats.text_responses += 1;
        }
        if group.has_tool_use {
            stats.tool_calls += 1;
        }
        if group.has_thinking {
            stats.thinking_blocks += 1;
        }
    }

    stats.duration_ms = match (first_ts, last_ts) {
        (Some(first), Some(last)) => {
            let delta = (last - first).num_milliseconds();
            (delta > 0).then_some(delta)
        }
        _ => None,
    };

    let mut models: BTreeSet<String> = BTreeSet::new();
    for file in fc.all_files() {
        for line in file.typed_lines() {
            if let Some(model) = line.model() {
                models.insert(model.to_string());
            }
        }
    }
    stats.models_used = models.into_iter().collect();

    if !auto_latencies_ms.is_empty() {
        stats.compaction_auto_avg_ms =
            Some(auto_latencies_ms.iter().sum::<i64>() / auto_latencies_ms.len() as i64);
    }

    stats
}
