use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use recount_engine::recap::{SMART_RECAP_SYSTEM_PROMPT, assemble_transcript, parse_recap_response};
use recount_store::Database;
use recount_transcript::FileCollection;
use recount_types::Cards;

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, LlmClient, MessageRequest};
use crate::{Error, Result};

/// How long the detached persistence step may run after the LLM call
/// completes. Detached so caller cancellation never leaves the advisory lock
/// held or the quota unspent.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct RecapInput<'a> {
    pub session_id: &'a str,
    pub user_id: &'a str,
    /// Queue-provided line count; becomes the card's `up_to_line`.
    pub total_lines: i64,
    pub collection: &'a FileCollection,
    /// Existing card stats rendered for the prompt, when available.
    pub existing_cards: Option<&'a Cards>,
}

#[derive(Debug, Default)]
pub struct RecapOutcome {
    /// True when another generator holds the lock; not an error, the next
    /// cycle retries.
    pub skipped: bool,
}

/// Generate and persist a smart recap for one session.
///
/// Sequence: acquire the in-row lock, assemble the bounded prompt, issue the
/// LLM call under its timeout, parse, persist (card upsert clears the lock,
/// title and quota ride along), all failures clearing the lock on the way
/// out.
pub async fn generate(
    db_path: &Path,
    llm: &dyn LlmClient,
    config: &LlmConfig,
    lock_timeout_secs: i64,
    input: RecapInput<'_>,
) -> Result<RecapOutcome> {
    {
        let db = Database::open(db_path)?;
        if !db.acquire_smart_recap_lock(input.session_id, lock_timeout_secs, Utc::now())? {
            return Ok(RecapOutcome { skipped: true });
        }
    }

    let assembled = assemble_transcript(input.collection, config.max_transcript_chars());
    let mut user_content = assembled.xml.clone();
    if let Some(cards) = input.existing_cards
        && let Some(stats) = stats_xml(cards)
    {
        user_content.push('\n');
        user_content.push_str(&stats);
    }

    let request = MessageRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        system: SMART_RECAP_SYSTEM_PROMPT.to_string(),
        messages: vec![
            ChatMessage::user(user_content),
            // prefill: forces the completion to continue a JSON object
            ChatMessage::assistant("{"),
        ],
    };

    let response = match tokio::time::timeout(
        Duration::from_secs(config.timeout_secs),
        llm.create_message(request),
    )
    .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            release_lock(db_path, input.session_id);
            return Err(err);
        }
        Err(_) => {
            release_lock(db_path, input.session_id);
            return Err(Error::Llm(format!(
                "recap call timed out after {}s",
                config.timeout_secs
            )));
        }
    };

    // the prefilled brace is part of the JSON but absent from the completion
    let completion = format!("{{{}", response.text);
    let recap = match parse_recap_response(&completion, &assembled.id_map) {
        Ok(recap) => recap,
        Err(err) => {
            warn!(
                session_id = input.session_id,
                raw = %response.text,
                "unusable recap completion"
            );
            release_lock(db_path, input.session_id);
            return Err(Error::Llm(err));
        }
    };

    // Persist on a detached task: if the caller is cancelled mid-await, the
    // write still lands and the lock is still released.
    let db_path_owned: PathBuf = db_path.to_path_buf();
    let session_id = input.session_id.to_string();
    let user_id = input.user_id.to_string();
    let total_lines = input.total_lines;
    let persist = tokio::spawn(async move {
        tokio::time::timeout(
            PERSIST_TIMEOUT,
            tokio::task::spawn_blocking(move || -> Result<()> {
                let db = Database::open(&db_path_owned)?;
                let now = Utc::now();
                db.upsert_smart_recap_card(&session_id, &recap, total_lines, now)?;
                if !recap.suggested_title.is_empty() {
                    db.update_suggested_title(&session_id, &recap.suggested_title)?;
                }
                db.increment_smart_recap_quota(&user_id, now)?;
                Ok(())
            }),
        )
        .await
    });

    let persisted: Result<()> = match persist.await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(join_err))) => Err(Error::from(join_err)),
        Ok(Err(_elapsed)) => Err(Error::Task("recap persistence timed out".to_string())),
        Err(join_err) => Err(Error::from(join_err)),
    };
    if let Err(err) = persisted {
        release_lock(db_path, input.session_id);
        return Err(err);
    }

    Ok(RecapOutcome::default())
}

fn release_lock(db_path: &Path, session_id: &str) {
    // best effort; a stuck lock still expires via the timeout
    match Database::open(db_path) {
        Ok(db) => {
            if let Err(err) = db.clear_smart_recap_lock(session_id) {
                warn!(session_id, error = %err, "failed to clear recap lock");
            }
        }
        Err(err) => warn!(session_id, error = %err, "failed to open store to clear lock"),
    }
}

/// Render existing card stats as a compact block appended to the prompt.
fn stats_xml(cards: &Cards) -> Option<String> {
    let session = cards.session.as_ref()?;
    let mut out = String::from("<session_stats>");
    out.push_str(&format!(
        "<messages total=\"{}\" user=\"{}\" assistant=\"{}\"/>",
        session.data.total_messages, session.data.user_messages, session.data.assistant_messages
    ));
    if let Some(duration) = session.data.duration_ms {
        out.push_str(&format!("<duration_ms>{}</duration_ms>", duration));
    }
    if let Some(tools) = cards.tools.as_ref() {
        out.push_str(&format!(
            "<tools total=\"{}\" errors=\"{}\"/>",
            tools.data.total_calls, tools.data.error_count
        ));
    }
    if let Some(tokens) = cards.tokens.as_ref() {
        out.push_str(&format!(
            "<tokens input=\"{}\" output=\"{}\"/>",
            tokens.data.input_tokens, tokens.data.output_tokens
        ));
    }
    out.push_str("</session_stats>");
    Some(out)
}
