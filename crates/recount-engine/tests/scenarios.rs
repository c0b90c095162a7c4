//! End-to-end analyzer scenarios over realistic transcript shapes: turn
//! timing, dedup across streaming and replay, compaction latency, and agent
//! attribution.

use rust_decimal::Decimal;
use serde_json::json;

use recount_engine::compute_from_file_collection;
use recount_testing::TranscriptBuilder;
use recount_transcript::{FileCollection, TranscriptFile};

fn single_file(builder: &TranscriptBuilder) -> FileCollection {
    FileCollection::new(TranscriptFile::from_bytes(&builder.bytes()).unwrap())
}

#[test]
fn two_assistants_one_model_prompt_cadence() {
    let mut t = TranscriptBuilder::new("s1");
    t.user_prompt("u1", "2025-03-01T10:00:00Z", "hello")
        .assistant_text(
            "a1",
            "2025-03-01T10:00:10Z",
            "msg-A",
            "claude-sonnet-4",
            "Hi",
            100,
            50,
        )
        .user_prompt("u2", "2025-03-01T10:01:00Z", "continue")
        .assistant_text(
            "a2",
            "2025-03-01T10:02:00Z",
            "msg-B",
            "claude-sonnet-4",
            "ok",
            200,
            100,
        )
        .user_prompt("u3", "2025-03-01T10:03:00Z", "done");

    let result = compute_from_file_collection(&single_file(&t));

    assert_eq!(result.conversation.user_turns, 3);
    assert_eq!(result.conversation.assistant_turns, 2);
    assert_eq!(result.session.duration_ms, Some(180_000));
    assert_eq!(result.session.models_used, vec!["claude-sonnet-4"]);
    assert_eq!(result.tokens.input_tokens, 300);
    assert_eq!(result.tokens.output_tokens, 150);

    // 300 in at $3/M + 150 out at $15/M
    assert_eq!(result.tokens.estimated_cost, "0.00315".parse::<Decimal>().unwrap());

    // turn timing: 10s + 60s assistant, 50s + 60s user thinking
    assert_eq!(result.conversation.total_assistant_ms, 70_000);
    assert_eq!(result.conversation.total_user_thinking_ms, 110_000);
    let utilization = result.conversation.assistant_utilization_pct.unwrap();
    assert!((utilization - 70.0 / 180.0 * 100.0).abs() < 1e-9);
    assert!((0.0..=100.0).contains(&utilization));
}

#[test]
fn streamed_message_with_replay_counts_once() {
    let mut t = TranscriptBuilder::new("s1");
    t.assistant(
        "a1",
        "2025-03-01T10:00:00Z",
        "msg-001",
        "claude-sonnet-4-5",
        json!([{"type": "thinking", "thinking": "hmm"}]),
        100,
        10,
    )
    .assistant(
        "a2",
        "2025-03-01T10:00:01Z",
        "msg-001",
        "claude-sonnet-4-5",
        json!([{"type": "text", "text": "done"}]),
        100,
        50,
    )
    .assistant(
        "a3",
        "2025-03-01T10:00:02Z",
        "msg-001",
        "claude-sonnet-4-5",
        json!([{"type": "tool_use", "id": "t1", "name": "Read",
                "input": {"file_path": "/src/lib.rs"}}]),
        100,
        80,
    )
    // context replay long after
    .assistant(
        "a9",
        "2025-03-01T11:00:00Z",
        "msg-001",
        "claude-sonnet-4-5",
        json!([{"type": "text", "text": "done"}]),
        100,
        80,
    );

    let fc = single_file(&t);
    let groups = fc.main().assistant_message_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].final_usage.output_tokens, 80);
    assert!(groups[0].has_text && groups[0].has_tool_use && groups[0].has_thinking);

    let result = compute_from_file_collection(&fc);
    // the four lines are one logical API call
    assert_eq!(result.tokens.output_tokens, 80);
    assert_eq!(result.tokens.input_tokens, 100);
    assert_eq!(result.session.assistant_messages, 1);
    assert_eq!(result.session.text_responses, 1);
    assert_eq!(result.session.thinking_blocks, 1);
}

#[test]
fn auto_compaction_latency_averages() {
    let mut t = TranscriptBuilder::new("s1");
    t.assistant_text(
        "a1",
        "2025-03-01T00:00:10Z",
        "m1",
        "claude-sonnet-4-5",
        "x",
        10,
        10,
    )
    .compact_boundary("c1", "2025-03-01T00:00:15Z", "auto", "a1", 150_000)
    .assistant_text(
        "a2",
        "2025-03-01T00:00:17Z",
        "m2",
        "claude-sonnet-4-5",
        "y",
        10,
        10,
    )
    .compact_boundary("c2", "2025-03-01T00:00:27Z", "auto", "a2", 120_000);

    let result = compute_from_file_collection(&single_file(&t));
    assert_eq!(result.session.compaction_auto, 2);
    assert_eq!(result.session.compaction_manual, 0);
    assert_eq!(result.session.compaction_auto_avg_ms, Some(7_500));
}

#[test]
fn manual_compaction_has_no_latency_sample() {
    let mut t = TranscriptBuilder::new("s1");
    t.assistant_text(
        "a1",
        "2025-03-01T00:00:10Z",
        "m1",
        "claude-sonnet-4-5",
        "x",
        10,
        10,
    )
    .compact_boundary("c1", "2025-03-01T00:00:15Z", "manual", "a1", 90_000);

    let result = compute_from_file_collection(&single_file(&t));
    assert_eq!(result.session.compaction_manual, 1);
    assert_eq!(result.session.compaction_auto, 0);
    assert_eq!(result.session.compaction_auto_avg_ms, None);
}

#[test]
fn agent_fallback_counts_only_without_agent_file() {
    let mut main = TranscriptBuilder::new("s1");
    main.user_prompt("u1", "2025-03-01T10:00:00Z", "explore the repo")
        .assistant_tool_use(
            "a1",
            "2025-03-01T10:00:05Z",
            "m1",
            "claude-sonnet-4-5",
            "t-read",
            "Read",
            json!({"file_path": "/src/main.rs"}),
        )
        .tool_result("u2", "2025-03-01T10:00:06Z", "t-read", false)
        .assistant_tool_use(
            "a2",
            "2025-03-01T10:00:10Z",
            "m2",
            "claude-sonnet-4-5",
            "t-task",
            "Task",
            json!({"subagent_type": "Explore", "prompt": "map the modules"}),
        )
        .agent_task_result(
            "u3",
            "2025-03-01T10:05:00Z",
            "t-task",
            "agent-a",
            10,
            5_000,
            1_000,
        );

    // without the agent file, the embedded totals stand in
    let fc = FileCollection::new(TranscriptFile::from_bytes(&main.bytes()).unwrap());
    let result = compute_from_file_collection(&fc);
    assert_eq!(result.tools.total_calls, 12);
    assert_eq!(result.tokens.input_tokens, 5_000 + 10 + 10);
    assert_eq!(result.agents_and_skills.agent_invocations, 1);
    assert_eq!(
        result.agents_and_skills.agents.get("Explore").unwrap().success,
        1
    );

    // with the agent file present, it is authoritative
    let mut agent = TranscriptBuilder::new("s1");
    agent
        .assistant_tool_use(
            "b1",
            "2025-03-01T10:01:00Z",
            "am1",
            "claude-haiku-4-5",
            "at1",
            "Grep",
            json!({"pattern": "fn main"}),
        )
        .assistant_tool_use(
            "b2",
            "2025-03-01T10:02:00Z",
            "am2",
            "claude-haiku-4-5",
            "at2",
            "Read",
            json!({"file_path": "/src/lib.rs"}),
        )
        .assistant_tool_use(
            "b3",
            "2025-03-01T10:03:00Z",
            "am3",
            "claude-haiku-4-5",
            "at3",
            "Read",
            json!({"file_path": "/src/util.rs"}),
        );

    let fc = FileCollection::with_agents(
        &main.bytes(),
        vec![("agent-a".to_string(), agent.bytes())],
    )
    .unwrap();
    let result = compute_from_file_collection(&fc);

    // 2 from main + 3 from the agent file; no fallback
    assert_eq!(result.tools.total_calls, 5);
    // agent usage comes from the file's own assistant lines, not the embed
    assert_eq!(result.tokens.input_tokens, 10 + 10 + 30);
    // models from agent files surface in the session card
    assert!(
        result
            .session
            .models_used
            .iter()
            .any(|m| m == "claude-haiku-4-5")
    );
}

#[test]
fn cross_turn_replay_does_not_create_assistant_turns() {
    let mut t = TranscriptBuilder::new("s1");
    t.user_prompt("u1", "2025-03-01T10:00:00Z", "first")
        .assistant_text(
            "a1",
            "2025-03-01T10:00:10Z",
            "msg-A",
            "claude-sonnet-4-5",
            "answer",
            100,
            50,
        )
        .user_prompt("u2", "2025-03-01T10:01:00Z", "second")
        // turn two contains only a replay of msg-A
        .assistant_text(
            "a2",
            "2025-03-01T10:01:05Z",
            "msg-A",
            "claude-sonnet-4-5",
            "answer",
            100,
            50,
        )
        .user_prompt("u3", "2025-03-01T10:02:00Z", "third");

    let result = compute_from_file_collection(&single_file(&t));
    assert_eq!(result.conversation.user_turns, 3);
    assert_eq!(result.conversation.assistant_turns, 1);
    // the replay-only turn contributes no assistant duration
    assert_eq!(result.conversation.total_assistant_ms, 10_000);
}

#[test]
fn untimed_prompt_resets_turn_state() {
    let mut t = TranscriptBuilder::new("s1");
    t.user_prompt("u1", "2025-03-01T10:00:00Z", "first")
        .assistant_text(
            "a1",
            "2025-03-01T10:00:10Z",
            "msg-A",
            "claude-sonnet-4-5",
            "answer",
            100,
            50,
        )
        .user_prompt_untimed("u2", "imported prompt")
        .assistant_text(
            "a2",
            "2025-03-01T10:01:00Z",
            "msg-B",
            "claude-sonnet-4-5",
            "more",
            100,
            50,
        );

    let result = compute_from_file_collection(&single_file(&t));
    assert_eq!(result.conversation.user_turns, 2);
    assert_eq!(result.conversation.assistant_turns, 2);
    // the open turn was dropped, so no durations were recorded for it
    assert_eq!(result.conversation.total_assistant_ms, 0);
    assert_eq!(result.conversation.total_user_thinking_ms, 0);
}

#[test]
fn code_activity_diff_math() {
    let mut t = TranscriptBuilder::new("s1");
    t.assistant_tool_use(
        "a1",
        "2025-03-01T10:00:00Z",
        "m1",
        "claude-sonnet-4-5",
        "t1",
        "Read",
        json!({"file_path": "/src/main.go"}),
    )
    .assistant_tool_use(
        "a2",
        "2025-03-01T10:00:05Z",
        "m2",
        "claude-sonnet-4-5",
        "t2",
        "Write",
        json!({"file_path": "/src/new.go", "content": "package main\n\nfunc main() {}\n"}),
    )
    .assistant_tool_use(
        "a3",
        "2025-03-01T10:00:10Z",
        "m3",
        "claude-sonnet-4-5",
        "t3",
        "Edit",
        json!({"file_path": "/src/new.go", "old_string": "func main() {}",
               "new_string": "func main() {\n\trun()\n}"}),
    )
    .assistant_tool_use(
        "a4",
        "2025-03-01T10:00:15Z",
        "m4",
        "claude-sonnet-4-5",
        "t4",
        "Grep",
        json!({"pattern": "run"}),
    );

    let result = compute_from_file_collection(&single_file(&t));
    let activity = &result.code_activity;
    assert_eq!(activity.files_read, 1);
    assert_eq!(activity.files_modified, 1); // Write and Edit hit the same path
    assert_eq!(activity.lines_added, 3 + 3); // write content + edit new_string
    assert_eq!(activity.lines_removed, 1);
    assert_eq!(activity.search_count, 1);
    assert_eq!(activity.language_breakdown.get("go"), Some(&1));
}

#[test]
fn skill_invocations_are_keyed_by_skill_name() {
    let mut t = TranscriptBuilder::new("s1");
    t.assistant_tool_use(
        "a1",
        "2025-03-01T10:00:00Z",
        "m1",
        "claude-sonnet-4-5",
        "sk1",
        "Skill",
        json!({"skill": "commit"}),
    )
    .tool_result("u1", "2025-03-01T10:00:01Z", "sk1", false)
    .skill_expansion("u2", "2025-03-01T10:00:02Z", "sk1", "expanded commit steps");

    let result = compute_from_file_collection(&single_file(&t));
    assert_eq!(result.agents_and_skills.skill_invocations, 1);
    let commit = result.agents_and_skills.skills.get("commit").unwrap();
    assert_eq!(commit.count, 1);
    assert_eq!(commit.success, 1);
}
