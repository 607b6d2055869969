//! Error types for minirank

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Store Errors ===
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown iteration: {0}")]
    UnknownIteration(u32),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // === Config Errors ===
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Graph Errors ===
    #[error("Graph source error: {0}")]
    GraphSource(String),

    #[error("Malformed graph description: {0}")]
    MalformedGraph(String),

    // === Protocol Errors ===
    #[error("Initial rank is zero for graph cardinality {cardinality}, increase the decimal scale")]
    ZeroInitialRank { cardinality: usize },

    #[error("All iterations completed, no work left (reset the store to run again)")]
    NoWorkLeft,

    #[error("The reducer completed before the mapper")]
    ReducerOutpacedMapper,

    #[error("Neither the mapper nor the reducer is enabled")]
    NoRoleEnabled,

    // === Generic ===
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a write-once collision with a peer?
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Does this error come from the operator's setup rather than the run itself?
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InvalidConfig(_)
                | Error::ZeroInitialRank { .. }
                | Error::NoWorkLeft
                | Error::NoRoleEnabled
        )
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_classification() {
        assert!(Error::AlreadyExists("rank 1@2".into()).is_already_exists());
        assert!(!Error::Internal("boom".into()).is_already_exists());
        assert!(!Error::UnknownIteration(3).is_already_exists());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::NoRoleEnabled.is_configuration());
        assert!(Error::ZeroInitialRank { cardinality: 0 }.is_configuration());
        assert!(!Error::ReducerOutpacedMapper.is_configuration());
    }
}
