use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("graphics state stack underflow: the page base state cannot be popped")]
    StackUnderflow,
    #[error("no page is open")]
    NoPageOpen,
    #[error("page closed with {open} graphics context scope(s) still open")]
    UnclosedScopes { open: usize },
    #[error("{kind} Font file not found: {path}")]
    FontFileNotFound { kind: &'static str, path: String },
    // Reported with the filesystem's own wording.
    #[error("{0}")]
    FontCacheNotFound(std::io::Error),
    #[error("invalid font data: {0}")]
    InvalidFont(String),
    #[error("undefined font: {0}")]
    UndefinedFont(String),
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    #[error("font metrics cache error: {0}")]
    Cache(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
