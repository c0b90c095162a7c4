use std::collections::HashSet;

use chrono::{DateTime, Utc};

use recount_transcript::{FileCollection, schema::TranscriptLine};
use recount_types::ConversationStats;

/// Turn structure and timing over the main transcript.
///
/// A turn opens at a human prompt and closes at the next one (or end of
/// stream). Assistant work time is measured prompt -> last assistant message;
/// user thinking time is measured last assistant message -> next prompt.
///
/// Replay handling is the strict rule: a message id observed in any earlier
/// turn is metadata-only forever after, so a turn consisting purely of
/// replayed context neither counts as an assistant turn nor contributes
/// timing.
pub fn analyze_conversation(fc: &FileCollection) -> ConversationStats {
    let mut stats = ConversationStats::default();

    let mut assistant_durations_ms: Vec<i64> = Vec::new();
    let mut user_thinking_ms: Vec<i64> = Vec::new();

    let mut last_prompt: Option<DateTime<Utc>> = None;
    let mut last_assist: Option<DateTime<Utc>> = None;
    let mut had_assist = false;
    let mut counted_this_turn = false;
    // ids seen since the current prompt vs. ids seen in any earlier turn
    let mut since_prompt: HashSet<String> = HashSet::new();
    let mut seen_before: HashSet<String> = HashSet::new();

    for parsed in &fc.main().lines {
        let line = &parsed.line;

        if line.is_human_message() {
            stats.user_turns += 1;

            let now = match line.timestamp() {
                Some(now) => now,
                None => {
                    // timestampless prompt: drop all in-flight turn state
                    seen_before.extend(since_prompt.drain());
                    last_prompt = None;
                    last_assist = None;
                    had_assist = false;
                    counted_this_turn = false;
                    continue;
                }
            };

            if let (Some(prompt_ts), Some(assist_ts)) = (last_prompt, last_assist)
                && had_assist
            {
                let delta = (assist_ts - prompt_ts).num_milliseconds();
                if delta >= 0 {
                    assistant_durations_ms.push(delta);
                }
            }
            if let Some(assist_ts) = last_assist {
                let delta = (now - assist_ts).num_milliseconds();
                if delta >= 0 {
                    user_thinking_ms.push(delta);
                }
            }

            seen_before.extend(since_prompt.drain());
            last_prompt = Some(now);
            last_assist = None;
            had_assist = false;
            counted_this_turn = false;
        } else if line.is_assistant_message() {
            let key = group_key(line);
            if since_prompt.contains(&key) {
                continue; // within-turn replay: nothing to update
            }
            since_prompt.insert(key.clone());
            if seen_before.contains(&key) {
                continue; // cross-turn replay: metadata only
            }

            if let Some(ts) = line.timestamp() {
                last_assist = Some(ts);
            }
            had_assist = true;
            if line.has_text_content() && !counted_this_turn {
                stats.assistant_turns += 1;
                counted_this_turn = true;
            }
        }
    }

    // close the final turn if one is open
    if let (Some(prompt_ts), Some(assist_ts)) = (last_prompt, last_assist)
        && had_assist
    {
        let delta = (assist_ts - prompt_ts).num_milliseconds();
        if delta >= 0 {
            assistant_durations_ms.push(delta);
        }
    }

    stats.total_assistant_ms = assistant_durations_ms.iter().sum();
    stats.total_user_thinking_ms = user_thinking_ms.iter().sum();
    if !assistant_durations_ms.is_empty() {
        stats.avg_assistant_turn_ms =
            Some(stats.total_assistant_ms / assistant_durations_ms.len() as i64);
    }
    if !user_thinking_ms.is_empty() {
        stats.avg_user_thinking_ms =
            Some(stats.total_user_thinking_ms / user_thinking_ms.len() as i64);
    }

    if !assistant_durations_ms.is_empty() && !user_thinking_ms.is_empty() {
        let combined = stats.total_assistant_ms + stats.total_user_thinking_ms;
        if combined > 0 {
            stats.assistant_utilization_pct =
                Some(stats.total_assistant_ms as f64 / combined as f64 * 100.0);
        }
    }

    stats
}

fn group_key(line: &TranscriptLine) -> String {
    match line {
        TranscriptLine::Assistant(a) if !a.message.id.is_empty() => a.message.id.clone(),
        _ => line.uuid().unwrap_or_default().to_string(),
    }
}
