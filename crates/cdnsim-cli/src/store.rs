//! C12: session-record source. A forward iterator over an embedded
//! persistent key-value store, keyed by insertion order.
//!
//! Grounded on `original_source/simul/eventreader.go`'s `DBEventReader`/
//! `TestEventReader` pair; `sled` stands in for `goleveldb`.

use anyhow::{Context, Result};
use cdnsim_core::SessionRecord;

/// Iterates `SessionRecord`s out of a `sled` tree in key order. Records are
/// serialized as JSON values keyed by `started · sid`, matching the
/// original's `startedTime · sid` key scheme.
pub struct SledRecordIter {
    inner: sled::Iter,
}

impl SledRecordIter {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path).with_context(|| format!("opening session store {path:?}"))?;
        Ok(Self { inner: db.iter() })
    }
}

impl Iterator for SledRecordIter {
    type Item = SessionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, value) = self.inner.next()?.ok()?;
            match serde_json::from_slice::<SessionRecord>(&value) {
                Ok(rec) => return Some(rec),
                Err(e) => {
                    tracing::error!(error = %e, "malformed session record in store, aborting");
                    return None;
                }
            }
        }
    }
}

/// Writes a batch of session records into a fresh `sled` tree at `path`,
/// one key per record ordered by `started · sid` so iteration replays them
/// in session-start order.
pub fn seed_sled_store(path: &std::path::Path, records: &[SessionRecord]) -> Result<()> {
    let db = sled::open(path).with_context(|| format!("opening session store {path:?}"))?;
    db.clear()?;
    for rec in records {
        let key = format!("{}·{}", rec.started.format("%Y-%m-%dT%H:%M:%S%.3f"), rec.sid);
        let value = serde_json::to_vec(rec)?;
        db.insert(key.as_bytes(), value)?;
    }
    db.flush()?;
    Ok(())
}
