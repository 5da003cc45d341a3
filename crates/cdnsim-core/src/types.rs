//! Core type definitions shared across the simulation core.

use serde::{Deserialize, Serialize};

/// Dense integer identifier assigned to a file the first time it is seen,
/// either from the file catalogue or on first sighting at runtime.
pub type FileId = i64;

/// Identifier of a configured VOD (edge server).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VodKey(pub String);

impl std::fmt::Display for VodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VodKey {
    fn from(s: &str) -> Self {
        VodKey(s.to_string())
    }
}

impl From<String> for VodKey {
    fn from(s: String) -> Self {
        VodKey(s)
    }
}

/// Fixed chunk size in bytes. Tests and seed scenarios depend on this exact
/// value.
pub const CHUNK_SIZE: i64 = 2_000_000;

/// Identifies a single fixed-size chunk of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub file_id: FileId,
    pub chunk_index: i64,
}

impl ChunkKey {
    pub const fn new(file_id: FileId, chunk_index: i64) -> Self {
        Self {
            file_id,
            chunk_index,
        }
    }

    pub const fn from_offset(file_id: FileId, offset: i64) -> Self {
        Self::new(file_id, offset / CHUNK_SIZE)
    }
}

/// A raw, already-normalized viewer session as replayed from the input
/// stream. `Started`/`Ended` carry millisecond resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub sid: String,
    pub started: chrono::NaiveDateTime,
    pub ended: chrono::NaiveDateTime,
    pub filename: String,
    /// Bits per second.
    pub bandwidth: i64,
    /// Byte offset of the viewer's start position within the file.
    pub offset: i64,
    /// Known file size, if present in the source record.
    pub filesize: Option<i64>,
    /// Set when the session is known to have been served from the origin.
    pub is_center: bool,
}

/// Event fed to the load balancer on session start/end.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub time: chrono::NaiveDateTime,
    pub sid: String,
    pub filename: String,
    pub file_id: FileId,
    pub bps: i64,
    pub duration_secs: i64,
}

/// Event fed to the load balancer/cache on chunk start/end.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkEvent {
    pub time: chrono::NaiveDateTime,
    pub sid: String,
    pub filename: String,
    pub file_id: FileId,
    pub bps: i64,
    pub index: i64,
    pub chunk_size: i64,
    pub bypass: bool,
    pub is_center: bool,
}

impl ChunkEvent {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.file_id, self.index)
    }
}
