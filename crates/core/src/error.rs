use thiserror::Error;

/// Failure while producing embeddings. Fatal during ingestion (no partial
/// index is ever written); at query time it degrades to an answerless
/// response instead of crashing the caller.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("embedding dimension {actual} does not match expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index build already in progress: {0}")]
    BuildInProgress(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request error: {0}")]
    Request(String),

    #[error("index not found at {0}; run ingestion first")]
    IndexNotFound(String),

    #[error("index is corrupt: {0}")]
    CorruptIndex(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("no relevant content found")]
    NoRelevantContent,

    #[error("generative model error: {0}")]
    GenerativeModel(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Stable user-facing category. Raw internal errors never cross the
    /// interface layer; callers branch on this instead.
    pub fn category(&self) -> &'static str {
        match self {
            QueryError::Request(_) => "bad_request",
            QueryError::IndexNotFound(_) => "index_not_found",
            QueryError::CorruptIndex(_) => "index_corrupt",
            QueryError::Embedding(_) => "embedding_unavailable",
            QueryError::NoRelevantContent => "no_relevant_content",
            QueryError::GenerativeModel(_) | QueryError::Http(_) => "generation_failed",
            QueryError::Url(_) => "bad_request",
            QueryError::Regex(_) | QueryError::Serialization(_) | QueryError::Io(_) => "internal",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            QueryError::Request(reason) => reason.clone(),
            QueryError::IndexNotFound(_) => {
                "No indexed documents found. Run the ingest command first.".to_string()
            }
            QueryError::CorruptIndex(_) => {
                "The document index is unreadable. Re-run ingestion.".to_string()
            }
            QueryError::Embedding(_) => {
                "The embedding model is unavailable; the question could not be processed."
                    .to_string()
            }
            QueryError::NoRelevantContent => {
                "No relevant information found in the documents or community contributions. \
                 Try rephrasing your question."
                    .to_string()
            }
            QueryError::GenerativeModel(_) | QueryError::Http(_) => {
                "The answer service is temporarily unavailable. Please try again.".to_string()
            }
            QueryError::Url(_)
            | QueryError::Regex(_)
            | QueryError::Serialization(_)
            | QueryError::Io(_) => {
                "An unexpected error occurred while processing your request.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ContributionError {
    #[error("contribution not found: {0}")]
    NotFound(String),

    #[error("invalid moderation transition: {0}")]
    InvalidTransition(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
