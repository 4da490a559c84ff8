use thiserror::Error;

/// Everything that can go wrong while planning or scraping a window.
///
/// Only `Configuration` is fatal to a run; the orchestrator catches the rest
/// per window, logs them and moves on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid route configuration: {0}")]
    Configuration(String),

    #[error("fetch timed out (no results): {url}")]
    FetchTimeout { url: String },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("boundary `{boundary}` not found (tried: {})", .attempts.join(", "))]
    BoundaryNotFound {
        boundary: &'static str,
        attempts: Vec<&'static str>,
        dump: Vec<String>,
    },

    #[error("segment rejected: {0}")]
    RecordBuild(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
