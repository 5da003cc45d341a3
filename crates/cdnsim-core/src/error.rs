//! Error types for the simulation core.

use thiserror::Error;

use crate::types::{ChunkKey, FileId, VodKey};

/// Cache-level invariant violations. These are fatal: the simulator aborts
/// the run rather than continuing in an inconsistent state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid chunk size for {key:?}: cached {cached}, event {expected}")]
    InvalidChunkSize {
        key: ChunkKey,
        cached: i64,
        expected: i64,
    },

    #[error("data size ({size}) > cache limit size ({limit})")]
    ChunkTooLarge { size: i64, limit: i64 },
}

/// Selector-level failures. Never fatal: the caller drops the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("failed to select vod: no available candidate")]
    NoAvailableVod,

    #[error("invalid cache/vod info: selector has no configured vods")]
    InvalidVodInfo,

    #[error("file not found in file-base storage")]
    FileNotFound,
}

/// Popularity-ranker control-flow signals, mapped to real `Result` values
/// instead of Go's sentinel errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RankerError {
    #[error("not exists addable file")]
    NotExistsAddable,
}

/// Load-balancer level errors, surfaced from `start_session`/`end_session`/
/// `start_chunk`/`end_chunk`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalancerError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("not exists session {0}")]
    UnknownSession(String),

    #[error("invalid vod key {0:?}")]
    UnknownVod(VodKey),

    #[error("not exists file info (id {0})")]
    UnknownFile(FileId),
}

/// Configuration validation errors. Always fatal at startup. Parsing of the
/// JSON/CSV/text source files themselves is an ingestion-layer concern (see
/// `cdnsim-cli`); this type covers only structural validity of an already
///-deserialized configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown selector policy: {0}")]
    UnknownSelector(String),
}
