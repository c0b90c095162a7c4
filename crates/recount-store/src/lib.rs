// SQLite persistence: one table per card plus the session/user/sync-file/
// quota metadata the scheduler and aggregator query. Raw transcripts never
// land here; cards are derived data and the blob store is the source of
// truth.

pub mod error;
pub mod queries;
pub mod records;
pub mod schema;

mod db;

pub use db::Database;
pub use error::{Error, Result};
pub use queries::cards::RegularCardsUpdate;
pub use queries::staleness::{
    StaleCandidate, StaleCategory, StaleSession, StalenessThresholds,
};
pub use records::{
    CardKind, CardMeta, QuotaRecord, SessionRecord, SyncFileRecord, UserRecord, decode_ts,
    encode_ts,
};
