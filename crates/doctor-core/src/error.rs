use thiserror::Error;

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("duplicate check name: {0}")]
    DuplicateCheckName(String),

    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidFilterPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("circular dependency detected: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("invalid date '{0}': use YYYY-MM-DD or a relative offset like -30M, -12h, -7d, -2w, -1m, -1y")]
    InvalidDateExpr(String),

    #[error("home directory not found: set HOME or pass --claude-home")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DoctorError>;
