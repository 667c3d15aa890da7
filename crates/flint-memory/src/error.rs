#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Query(#[from] flint_query::Error),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}
