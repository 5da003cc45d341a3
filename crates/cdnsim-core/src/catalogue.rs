//! File catalogue: dense-id registry of known files, keyed both by name and
//! by id. Grounded on `original_source/data/fileinfo.go`'s `FileInfos`.

use std::collections::HashMap;

use crate::types::FileId;

/// Metadata for a single catalogued file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileInfo {
    pub id: FileId,
    pub filename: String,
    pub size: i64,
    pub bitrate: i64,
    pub register_time: chrono::NaiveDateTime,
}

/// Registry of files indexed by both id and name. New files encountered at
/// runtime (deliver events, first sighting of an unknown filename) are
/// assigned the next free id.
#[derive(Debug, Default)]
pub struct FileCatalogue {
    by_id: HashMap<FileId, FileInfo>,
    by_name: HashMap<String, FileId>,
    last_id: FileId,
}

impl FileCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry with an explicit id, as loaded from the file
    /// catalogue CSV. Overwrites any existing entry with the same id.
    pub fn register(&mut self, info: FileInfo) {
        self.last_id = self.last_id.max(info.id);
        self.by_name.insert(info.filename.clone(), info.id);
        self.by_id.insert(info.id, info);
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.by_name.contains_key(filename)
    }

    pub fn exists_id(&self, id: FileId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Returns the id for `filename`, assigning the next free id and
    /// registering a new entry if it has never been seen before.
    pub fn id_for(
        &mut self,
        filename: &str,
        size: i64,
        bitrate: i64,
        register_time: chrono::NaiveDateTime,
    ) -> FileId {
        if let Some(&id) = self.by_name.get(filename) {
            return id;
        }
        self.last_id += 1;
        let id = self.last_id;
        self.register(FileInfo {
            id,
            filename: filename.to_string(),
            size,
            bitrate,
            register_time,
        });
        id
    }

    /// Looks up the id of a known filename without registering it.
    pub fn id_of(&self, filename: &str) -> Option<FileId> {
        self.by_name.get(filename).copied()
    }

    pub fn info(&self, id: FileId) -> Option<&FileInfo> {
        self.by_id.get(&id)
    }

    pub fn info_by_name(&self, filename: &str) -> Option<&FileInfo> {
        self.by_name.get(filename).and_then(|id| self.by_id.get(id))
    }
}
