use thiserror::Error;

/// Errors reported before a search starts.
///
/// Normal terminations (queue exhausted, annealing cooled, cancellation) are
/// not errors and never show up here.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("piece catalog is empty")]
    EmptyCatalog,

    #[error("grid must have non-zero width and height (got {width}x{height})")]
    DegenerateGrid { width: usize, height: usize },

    #[error("invalid piece '{id}': {reason}")]
    InvalidPiece { id: String, reason: String },

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PackError>;
