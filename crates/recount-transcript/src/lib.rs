// Transcript model: line schema, per-line validation, file collections, and
// message-id deduplication. Everything here is pure; no I/O beyond readers.

pub mod error;

mod collection;
mod file;
mod groups;
pub mod schema;
pub mod validate;

pub use collection::{FileCollection, agent_id_from_file_name};
pub use error::{Error, Result};
pub use file::{INITIAL_BUFFER_BYTES, MAX_LINE_BYTES, ParsedLine, TranscriptFile};
pub use groups::AssistantMessageGroup;
pub use validate::{FieldError, LineValidationError, validate_line};
