// Background orchestration: the precompute scheduler's two polling loops,
// the trends/org aggregation fan-out, and the smart-recap generator, plus
// the blob-store and LLM contracts they depend on.

pub mod error;

mod aggregator;
mod blob;
mod config;
mod llm;
mod recap;
mod scheduler;

pub use aggregator::{Aggregator, normalize_repo_url};
pub use blob::{BlobStore, FsBlobStore};
pub use config::{Config, LlmConfig, SchedulerConfig, ThresholdsConfig};
pub use error::{Error, Result};
pub use llm::{ANTHROPIC_VERSION, ChatMessage, ChatRole, HttpLlmClient, LlmClient, MessageRequest, MessageResponse};
pub use recap::{RecapInput, RecapOutcome, generate};
pub use scheduler::Scheduler;
