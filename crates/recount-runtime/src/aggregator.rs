use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use recount_store::{Database, queries};
use recount_types::{OrgAnalyticsRequest, OrgAnalyticsResponse, TrendsRequest, TrendsResponse};

use crate::{Error, Result};

/// Cross-session read path: per-user trends and per-organization analytics.
/// The four trend sub-aggregations fan out concurrently, each on its own
/// SQLite connection; any sub-error fails the whole call.
pub struct Aggregator {
    db_path: PathBuf,
}

impl Aggregator {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub async fn get_trends(&self, user_id: &str, req: &TrendsRequest) -> Result<TrendsResponse> {
        let session_ids = self.resolve_sessions(user_id, req).await?;
        let window = queries::trends::TrendsWindow {
            start_ts: req.start_ts,
            end_ts: req.end_ts,
            tz_offset_minutes: req.tz_offset_minutes,
        };

        let (activity, tokens, tools, agents_skills) = tokio::try_join!(
            run_query(&self.db_path, {
                let ids = session_ids.clone();
                move |db| queries::trends::activity_day_series(db.conn(), &window, &ids)
            }),
            run_query(&self.db_path, {
                let ids = session_ids.clone();
                move |db| queries::trends::token_day_series(db.conn(), &window, &ids)
            }),
            run_query(&self.db_path, {
                let ids = session_ids.clone();
                move |db| queries::trends::tool_totals(db.conn(), &ids)
            }),
            run_query(&self.db_path, {
                let ids = session_ids;
                move |db| queries::trends::agent_skill_totals(db.conn(), &ids)
            }),
        )?;

        let (agents, skills) = agents_skills;
        Ok(TrendsResponse {
            activity,
            tokens,
            tools,
            agents,
            skills,
        })
    }

    pub async fn get_org_analytics(&self, req: &OrgAnalyticsRequest) -> Result<OrgAnalyticsResponse> {
        let start_ts = req.start_ts;
        let end_ts = req.end_ts;
        let users = run_query(&self.db_path, move |db| {
            queries::org::org_analytics(db.conn(), start_ts, end_ts)
        })
        .await?;
        Ok(OrgAnalyticsResponse { users })
    }

    /// Sessions of the user in range, filtered by normalized repo. An empty
    /// repo list means no repo restriction; otherwise sessions match when
    /// their `org/name` is listed, plus repo-less sessions when
    /// `include_no_repo` is set.
    async fn resolve_sessions(&self, user_id: &str, req: &TrendsRequest) -> Result<Vec<String>> {
        let user_id = user_id.to_string();
        let (start_ts, end_ts) = (req.start_ts, req.end_ts);
        let rows = run_query(&self.db_path, move |db| {
            queries::session::list_for_user_in_range(db.conn(), &user_id, start_ts, end_ts)
        })
        .await?;

        if req.repos.is_empty() {
            return Ok(rows.into_iter().map(|(id, _)| id).collect());
        }

        let wanted: HashSet<String> = req
            .repos
            .iter()
            .filter_map(|r| normalize_repo_url(r))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|(id, git_info)| {
                match git_info.as_deref().and_then(repo_from_git_info) {
                    Some(repo) => wanted.contains(&repo).then_some(id),
                    None => req.include_no_repo.then_some(id),
                }
            })
            .collect())
    }
}

async fn run_query<T, F>(db_path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> recount_store::Result<T> + Send + 'static,
{
    let db_path = db_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<T> {
        let db = Database::open(&db_path)?;
        Ok(f(&db)?)
    })
    .await
    .map_err(Error::from)?
}

/// Normalized `org/name` of a git remote URL, with the `.git` suffix
/// stripped. Handles https, ssh (`git@host:org/name`), and bare `org/name`
/// inputs; None when no two path segments exist.
pub fn normalize_repo_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_suffix = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    // scp-style ssh remotes separate host and path with a colon
    let path = match without_suffix.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => match without_suffix.split_once(':') {
            Some((_, path)) => path,
            None => without_suffix,
        },
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    Some(format!(
        "{}/{}",
        segments[segments.len() - 2],
        segments[segments.len() - 1]
    ))
}

fn repo_from_git_info(git_info: &str) -> Option<String> {
    let value: Value = serde_json::from_str(git_info).ok()?;
    value
        .get("remote_url")
        .and_then(Value::as_str)
        .and_then(normalize_repo_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_remote_shapes() {
        for url in [
            "https://github.com/acme/app.git",
            "https://github.com/acme/app",
            "git@github.com:acme/app.git",
            "ssh://git@github.com/acme/app.git",
            "acme/app",
            "https://github.com/acme/app/",
        ] {
            assert_eq!(
                normalize_repo_url(url).as_deref(),
                Some("acme/app"),
                "failed for {url}"
            );
        }
    }

    #[test]
    fn rejects_urls_without_a_repo_path() {
        assert_eq!(normalize_repo_url("https://github.com/"), None);
        assert_eq!(normalize_repo_url("justaname"), None);
    }

    #[test]
    fn extracts_repo_from_git_info_json() {
        let git_info = r#"{"remote_url": "git@github.com:acme/app.git", "branch": "main"}"#;
        assert_eq!(repo_from_git_info(git_info).as_deref(), Some("acme/app"));
        assert_eq!(repo_from_git_info(r#"{"branch": "main"}"#), None);
        assert_eq!(repo_from_git_info("not json"), None);
    }
}
