use thiserror::Error;

/// Failure to retrieve a page. No retries happen at this layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::HttpStatus(status.as_u16()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

/// Stage-level extraction failure. Callers on the ingestion path turn
/// this into a stub record; it never escapes `extract_from_url`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing identifier in {0}")]
    MissingIdentifier(String),
}

impl From<quick_xml::Error> for ExtractError {
    fn from(err: quick_xml::Error) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

/// Failure talking to the language model. The assistant answers locally
/// instead of surfacing these.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("empty response from model")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("paper not found: '{0}'")]
    PaperNotFound(String),

    #[error("could not load paper content from {0}")]
    ContentUnavailable(String),
}
