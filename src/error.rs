use thiserror::Error;

/// Failure while fetching the replacement dataset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Host unreachable, socket level failure or timeout.
    #[error("Unreachable: {0}")]
    Unreachable(String),
    #[error("Transfer failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),
    #[error("Malformed facet '{facet}': {message}")]
    MalformedFacet { facet: String, message: String },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Snapshot error: {message}")]
    Snapshot { message: String, line: Option<usize> },
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("A dataset refresh is in progress")]
    Busy,
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn malformed(facet: &str, message: impl Into<String>) -> Self {
        Self::MalformedFacet {
            facet: facet.to_string(),
            message: message.into(),
        }
    }
    pub fn snapshot(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::Snapshot {
            message: message.into(),
            line,
        }
    }
    /// True for mistakes made by the caller rather than failures of the store.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity(_) | Self::UnknownRelation(_) | Self::MalformedFacet { .. }
        )
    }
}

// Helper conversions
impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<config::ConfigError> for CatalogError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
