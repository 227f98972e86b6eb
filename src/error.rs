use std::path::PathBuf;

/// Structural input failures. Anything recoverable (missing bookmark pages,
/// unmatched blocks, failed sum checks) is represented as data instead.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("bookmark {title:?} points at page {page} but the document has {total_pages} pages")]
    PageOutOfRange {
        title: String,
        page: u32,
        total_pages: usize,
    },
    #[error("page {index} unavailable: {reason}")]
    PageUnavailable { index: usize, reason: String },
    #[error("invalid outline: {0}")]
    InvalidOutline(String),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type ExtractResult<T> = Result<T, ExtractError>;
