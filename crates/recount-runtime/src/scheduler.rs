use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use recount_engine::compute_from_file_collection;
use recount_store::{Database, QuotaRecord, RegularCardsUpdate, StaleSession};
use recount_transcript::{FileCollection, agent_id_from_file_name};

use crate::blob::BlobStore;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::recap::{RecapInput, RecapOutcome, generate};
use crate::{Error, Result};

/// The precompute scheduler: two independent polling loops over the same
/// staleness machinery. Regular cards are cheap and run on a fast cadence;
/// smart recaps cost an LLM call each and poll slowly with higher floors.
/// Each stale session is handled end-to-end: blob fetch, parse, analyze,
/// upsert. One failed session logs and never stops a cycle.
pub struct Scheduler {
    db_path: PathBuf,
    blob: Arc<dyn BlobStore>,
    llm: Arc<dyn LlmClient>,
    config: Config,
}

impl Scheduler {
    pub fn new(config: Config, blob: Arc<dyn BlobStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            db_path: config.database_path.clone(),
            blob,
            llm,
            config,
        }
    }

    /// Drive both loops until `shutdown` flips to true. In-flight sessions
    /// complete before either loop exits.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tokio::join!(
            self.run_regular_loop(shutdown.clone()),
            self.run_smart_recap_loop(shutdown),
        );
    }

    pub async fn run_regular_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.scheduler.regular_poll_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.regular_cycle(&shutdown).await {
                        warn!(error = %err, "regular precompute cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    // a dropped sender counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                info!("regular precompute loop stopping");
                break;
            }
        }
    }

    pub async fn run_smart_recap_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(
            self.config.scheduler.smart_recap_poll_secs,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.smart_recap_cycle(&shutdown).await {
                        warn!(error = %err, "smart-recap cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                info!("smart-recap loop stopping");
                break;
            }
        }
    }

    async fn regular_cycle(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        let thresholds = self.config.scheduler.regular.thresholds();
        let stale = {
            let db = Database::open(&self.db_path)?;
            db.find_stale_sessions(&thresholds, Utc::now(), self.config.scheduler.batch_limit)?
        };
        if !stale.is_empty() {
            debug!(count = stale.len(), "stale sessions picked up");
        }

        for session in stale {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.precompute_regular_cards(&session).await {
                warn!(
                    session_id = %session.session_id,
                    error = %err,
                    "regular card precompute failed; will retry next cycle"
                );
            }
        }
        Ok(())
    }

    async fn smart_recap_cycle(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        let thresholds = self.config.scheduler.smart_recap.thresholds();
        let stale = {
            let db = Database::open(&self.db_path)?;
            db.find_stale_smart_recap_sessions(
                &thresholds,
                Utc::now(),
                self.config.scheduler.batch_limit,
            )?
        };

        for session in stale {
            if *shutdown.borrow() {
                break;
            }
            match self.precompute_smart_recap(&session).await {
                Ok(outcome) if outcome.skipped => {
                    debug!(session_id = %session.session_id, "recap skipped");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        session_id = %session.session_id,
                        error = %err,
                        "smart-recap precompute failed; will retry next cycle"
                    );
                }
            }
        }
        Ok(())
    }

    /// Recompute and persist the seven regular cards for one session. The
    /// queue-provided `total_lines` becomes the snapshot's `up_to_line`.
    pub async fn precompute_regular_cards(&self, session: &StaleSession) -> Result<()> {
        let collection = self.fetch_collection(session).await?;
        let result = compute_from_file_collection(&collection);

        let update = RegularCardsUpdate {
            tokens: Some(&result.tokens),
            session: Some(&result.session),
            tools: Some(&result.tools),
            code_activity: Some(&result.code_activity),
            conversation: Some(&result.conversation),
            agents_and_skills: Some(&result.agents_and_skills),
            redactions: Some(&result.redactions),
        };

        let db = Database::open(&self.db_path)?;
        db.upsert_regular_cards(&session.session_id, &update, session.total_lines, Utc::now())?;
        Ok(())
    }

    /// Run the smart-recap generator for one session, gated by the per-user
    /// daily quota (exceeding it is a silent skip, not an error).
    pub async fn precompute_smart_recap(&self, session: &StaleSession) -> Result<RecapOutcome> {
        let (cards, quota) = {
            let db = Database::open(&self.db_path)?;
            (
                db.get_cards(&session.session_id)?,
                db.smart_recap_quota(&session.user_id)?,
            )
        };

        if quota_exhausted(quota.as_ref(), self.config.llm.daily_quota, Utc::now()) {
            debug!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                "recap quota exhausted; skipping"
            );
            return Ok(RecapOutcome { skipped: true });
        }

        let collection = self.fetch_collection(session).await?;
        generate(
            &self.db_path,
            self.llm.as_ref(),
            &self.config.llm,
            self.config.scheduler.lock_timeout_secs,
            RecapInput {
                session_id: &session.session_id,
                user_id: &session.user_id,
                total_lines: session.total_lines,
                collection: &collection,
                existing_cards: Some(&cards),
            },
        )
        .await
    }

    /// Download and assemble a session's transcript files. The main
    /// transcript is required; an agent file that fails to download degrades
    /// to absence (its embedded fallbacks then count instead).
    async fn fetch_collection(&self, session: &StaleSession) -> Result<FileCollection> {
        let files = {
            let db = Database::open(&self.db_path)?;
            db.session_files(&session.session_id)?
        };

        let main = files
            .iter()
            .find(|f| f.file_type == "transcript")
            .ok_or_else(|| {
                Error::Blob(format!(
                    "session {} has no transcript sync file",
                    session.session_id
                ))
            })?;
        let main_bytes = self
            .blob
            .download_and_merge(&session.user_id, &session.external_id, &main.file_name)
            .await?;

        let mut agents = Vec::new();
        for file in files.iter().filter(|f| f.file_type == "agent") {
            match self
                .blob
                .download_and_merge(&session.user_id, &session.external_id, &file.file_name)
                .await
            {
                Ok(bytes) => agents.push((agent_id_from_file_name(&file.file_name), bytes)),
                Err(err) => {
                    warn!(
                        session_id = %session.session_id,
                        file = %file.file_name,
                        error = %err,
                        "agent blob fetch failed; continuing without it"
                    );
                }
            }
        }

        Ok(FileCollection::with_agents(&main_bytes, agents)?)
    }
}

fn quota_exhausted(quota: Option<&QuotaRecord>, daily_limit: i64, now: DateTime<Utc>) -> bool {
    let Some(quota) = quota else {
        return false;
    };
    if quota.compute_count < daily_limit {
        return false;
    }
    // the count resets on a new UTC day, so an old exhausted count is moot
    quota
        .last_compute_at
        .is_some_and(|last| last.date_naive() == now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_gate_respects_day_boundary() {
        let now = Utc::now();
        let quota = QuotaRecord {
            user_id: "u1".to_string(),
            compute_count: 50,
            last_compute_at: Some(now),
        };
        assert!(quota_exhausted(Some(&quota), 50, now));
        assert!(!quota_exhausted(Some(&quota), 51, now));

        let stale = QuotaRecord {
            last_compute_at: Some(now - chrono::Duration::days(1)),
            ..quota
        };
        assert!(!quota_exhausted(Some(&stale), 50, now));
        assert!(!quota_exhausted(None, 50, now));
    }
}
