// Shared analytic types: cards, card versions, request/response DTOs
// This layer holds schemas only; parsing and analysis live in other crates

mod cards;
mod dto;
mod recap;

pub use cards::{
    AgentsSkillsStats, Cards, CodeActivityStats, ConversationStats, InvocationStats,
    RedactionsStats, SessionStats, StoredCard, TokensStats, ToolCallStats, ToolsStats,
    AGENTS_AND_SKILLS_CARD_VERSION, CODE_ACTIVITY_CARD_VERSION, CONVERSATION_CARD_VERSION,
    REDACTIONS_CARD_VERSION, SESSION_CARD_VERSION, SMART_RECAP_CARD_VERSION, TOKENS_CARD_VERSION,
    TOOLS_CARD_VERSION,
};
pub use dto::{
    DayActivity, DayCost, OrgAnalyticsRequest, OrgAnalyticsResponse, OrgUserAnalytics,
    TrendsRequest, TrendsResponse,
};
pub use recap::{AnnotatedItem, MessageRef, SmartRecap};
