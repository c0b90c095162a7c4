// The analyzer suite: pure functions of a FileCollection, no I/O. Each
// produces one card payload; the compute entry point runs them in sequence.

mod agents_skills;
mod code_activity;
mod conversation;
mod redactions;
mod session;
mod tokens;
mod tools;

pub use agents_skills::analyze_agents_skills;
pub use code_activity::analyze_code_activity;
pub use conversation::analyze_conversation;
pub use redactions::analyze_redactions;
pub use session::analyze_session;
pub use tokens::analyze_tokens;
pub use tools::analyze_tools;
