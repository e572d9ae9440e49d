use thiserror::Error;

/// Errors surfaced by the dispatch/cache/generator subsystem.
///
/// Variants map directly onto the response shapes the HTTP layer must
/// produce (see `handlers::targets`), plus a few infrastructure errors
/// that only ever show up at startup or in logs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cache miss")]
    CacheNotExist,

    #[error("cache expired, you should try again later")]
    CacheExpired {
        updated_timestamp: f64,
        cache_expire_seconds: u64,
    },

    #[error("cache file is not valid json")]
    CacheNotValidJson,

    #[error("generator failed: {0}")]
    GeneratorFailure(String),

    #[error("timed out waiting for generation")]
    Timeout,

    #[error("unknown generator file type: {0}")]
    UnknownFileType(String),

    #[error("path not found under root: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl Error {
    /// Stable machine-readable kind, independent of the Display message;
    /// used for metric labels.
    pub fn status_label(&self) -> &'static str {
        match self {
            Error::CacheNotExist => "cache-not-exist",
            Error::CacheExpired { .. } => "cache-expired",
            Error::CacheNotValidJson => "cache-not-valid-json",
            Error::GeneratorFailure(_) => "fail",
            Error::Timeout => "timeout",
            Error::UnknownFileType(_) => "fail",
            Error::NotFound(_) => "not-found",
            Error::Io(_) => "io-error",
            Error::Json(_) => "json-error",
            Error::Yaml(_) => "yaml-error",
            Error::Redis(_) => "redis-error",
        }
    }
}

/// A cloneable, independently-owned snapshot of an `Error`.
///
/// The single-flight cache replays a cached failure to every waiter; two
/// concurrent callers must each get their own copy rather than sharing
/// mutable error state, so we keep a simplified string-based clone instead
/// of deriving `Clone` on the original error (several variants wrap
/// non-`Clone` upstream error types).
#[derive(Debug, Clone)]
pub struct ClonedError {
    pub label: &'static str,
    pub message: String,
}

impl std::fmt::Display for ClonedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClonedError {}

impl From<&Error> for ClonedError {
    fn from(e: &Error) -> Self {
        ClonedError {
            label: e.status_label(),
            message: e.to_string(),
        }
    }
}

impl From<ClonedError> for Error {
    fn from(e: ClonedError) -> Self {
        match e.label {
            "timeout" => Error::Timeout,
            _ => Error::GeneratorFailure(e.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
