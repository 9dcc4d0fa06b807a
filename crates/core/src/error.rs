use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("directory does not exist: {0}")]
    MissingDirectory(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("source is not valid utf-8: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from embedding endpoint ({status}): {details}")]
    BackendResponse { status: u16, details: String },

    #[error("embedding model returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} does not match model dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),

    #[error("embedding batch {batch_index} (inputs {start}..{end}) failed: {source}")]
    BatchFailed {
        batch_index: usize,
        start: usize,
        end: usize,
        #[source]
        source: Box<EmbedError>,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection {collection} not found")]
    MissingCollection { collection: String },

    #[error(
        "collection {collection} is configured for dimension {configured}, embeddings have {requested}"
    )]
    DimensionMismatch {
        collection: String,
        configured: usize,
        requested: usize,
    },

    #[error("store request failed: {0}")]
    Request(String),

    #[error("upsert batch {batch_index} failed with {remaining} batch(es) not attempted: {source}")]
    BatchFailed {
        batch_index: usize,
        remaining: usize,
        #[source]
        source: Box<StoreError>,
    },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("vector store is not reachable: {0}")]
    Unavailable(String),

    #[error("query is empty")]
    EmptyQuery,

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid training data json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid training data at line {line}: {details}")]
    Record { line: usize, details: String },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
