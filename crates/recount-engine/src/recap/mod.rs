// Pure halves of smart-recap generation: transcript assembly into the XML
// prompt input, and completion parsing back into the card payload. Lock
// handling, the LLM call, and persistence live in the runtime crate.

mod assemble;
mod prompt;
mod response;

pub use assemble::{
    AssembledTranscript, OVERFLOW_NOTICE, SKILL_CONTENT_CHARS, TEXT_CHARS, THINKING_CHARS,
    TRUNCATION_SUFFIX, USER_CONTENT_CHARS, assemble_transcript, truncate_chars,
};
pub use prompt::SMART_RECAP_SYSTEM_PROMPT;
pub use response::{
    RawRecapResponse, extract_json_object, parse_recap_response, DEFAULT_CONTEXT_SUGGESTIONS_CAP,
    ENVIRONMENT_SUGGESTIONS_CAP, HUMAN_SUGGESTIONS_CAP, TITLE_CHARS, WENT_BAD_CAP, WENT_WELL_CAP,
};
