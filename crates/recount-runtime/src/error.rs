use std::fmt;

/// Result type for recount-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Store/database layer error
    Store(recount_store::Error),

    /// Transcript parsing error
    Transcript(recount_transcript::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Blob store failure (missing object, merge failure)
    Blob(String),

    /// LLM call failed, timed out, or returned an unusable completion
    Llm(String),

    /// HTTP transport error
    Http(reqwest::Error),

    /// Background task failed to join
    Task(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Transcript(err) => write!(f, "Transcript error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Blob(msg) => write!(f, "Blob store error: {}", msg),
            Error::Llm(msg) => write!(f, "LLM error: {}", msg),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Task(msg) => write!(f, "Task error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Transcript(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::Config(_) | Error::Blob(_) | Error::Llm(_) | Error::Task(_) => None,
        }
    }
}

impl From<recount_store::Error> for Error {
    fn from(err: recount_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<recount_transcript::Error> for Error {
    fn from(err: recount_transcript::Error) -> Self {
        Error::Transcript(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
