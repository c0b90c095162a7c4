use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::{InvocationStats, ToolCallStats};

/// Cross-session trends request. Epochs are UTC seconds, `end_ts` exclusive.
/// `tz_offset_minutes` follows the JS `getTimezoneOffset` sign convention:
/// UTC = local + offset minutes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsRequest {
    pub start_ts: i64,
    pub end_ts: i64,
    pub tz_offset_minutes: i64,
    /// Repo filter; entries are normalized to `org/name` before matching.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Also include sessions that have no repo URL at all.
    #[serde(default)]
    pub include_no_repo: bool,
}

/// One local-calendar day in the activity series. Every date in the requested
/// range appears, including zero-activity days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayActivity {
    /// Local date, `YYYY-MM-DD`.
    pub date: String,
    pub sessions: u64,
    pub user_turns: u64,
    pub assistant_turns: u64,
    pub duration_ms: i64,
    pub avg_utilization_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayCost {
    pub date: String,
    /// Decimal cost rendered as a string, summed over the day's sessions.
    pub cost: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsResponse {
    pub activity: Vec<DayActivity>,
    pub tokens: Vec<DayCost>,
    pub tools: BTreeMap<String, ToolCallStats>,
    pub agents: BTreeMap<String, InvocationStats>,
    pub skills: BTreeMap<String, InvocationStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgAnalyticsRequest {
    pub start_ts: i64,
    pub end_ts: i64,
    pub tz_offset_minutes: i64,
}

/// Per-user organization analytics. A qualifying session has both a tokens
/// card and a conversation card inside the range; active users with none
/// appear with zero-valued fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgUserAnalytics {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub session_count: u64,
    /// Total cost with two fixed decimals, e.g. "12.50".
    pub total_cost: String,
    pub total_tokens: u64,
    pub avg_session_duration_ms: Option<i64>,
    pub avg_utilization_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgAnalyticsResponse {
    pub users: Vec<OrgUserAnalytics>,
}
