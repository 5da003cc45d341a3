//! C7: file-base content placement.
//!
//! Grounded on `original_source/lb/storage.go`: a push-queue with FIFO
//! in-flight delay, a dawn-hour push multiplier, and external deliver/purge
//! streams that sit alongside the popularity-ranker-driven push/delete
//! cycle.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::catalogue::FileCatalogue;
use crate::config::FileBaseConfig;
use crate::ranker::{DeleteLruRanker, HitRanker};
use crate::types::FileId;

const DAWN_START_HOUR: u32 = 3;
const DAWN_END_HOUR: u32 = 9;

/// An out-of-band content arrival, pre-sorted by `time`.
#[derive(Clone, Debug)]
pub struct DeliverEvent {
    pub time: chrono::NaiveDateTime,
    pub filename: String,
    pub filesize: i64,
}

/// An out-of-band forced removal, pre-sorted by `time`.
#[derive(Clone, Debug)]
pub struct PurgeEvent {
    pub time: chrono::NaiveDateTime,
    pub filename: String,
}

/// Either concrete deletion-ranking strategy file-base storage can be
/// configured with.
pub enum DeleteRanker {
    SameAsHit,
    Lru(DeleteLruRanker),
}

impl DeleteRanker {
    fn deletable(
        &self,
        hit_ranker: &HitRanker,
        current: &HashSet<FileId>,
        min_free_bytes: i64,
        now: chrono::NaiveDateTime,
        catalogue: &FileCatalogue,
    ) -> Vec<FileId> {
        match self {
            DeleteRanker::SameAsHit => hit_ranker.deletable(current, min_free_bytes, now, catalogue),
            DeleteRanker::Lru(r) => r.deletable(current, min_free_bytes, now, catalogue),
        }
    }

    pub fn on_session_start(&mut self, evt: &crate::types::SessionEvent) {
        if let DeleteRanker::Lru(r) = self {
            r.on_session_start(evt);
        }
    }
}

/// Simulated single-VOD storage budget driven by the popularity ranker.
pub struct FileBaseStorage {
    contents: HashSet<FileId>,
    cur_size: i64,
    limit_size: i64,
    pushing_queue: VecDeque<FileId>,
    pushed_t: Option<chrono::NaiveDateTime>,
    cfg: FileBaseConfig,
    deliver: Vec<DeliverEvent>,
    deliver_cursor: usize,
    purge: Vec<PurgeEvent>,
    purge_cursor: usize,
}

impl FileBaseStorage {
    pub fn new(
        limit_size: i64,
        cfg: FileBaseConfig,
        mut deliver: Vec<DeliverEvent>,
        mut purge: Vec<PurgeEvent>,
    ) -> Self {
        deliver.sort_by_key(|e| e.time);
        purge.sort_by_key(|e| e.time);
        Self {
            contents: HashSet::new(),
            cur_size: 0,
            limit_size,
            pushing_queue: VecDeque::new(),
            pushed_t: None,
            cfg,
            deliver,
            deliver_cursor: 0,
            purge,
            purge_cursor: 0,
        }
    }

    /// Seeds initial resident content in file order until `limit_size`
    /// would be exceeded. Grounded on the "hitcount history" text listing
    /// format of spec.md §4.12.
    pub fn seed_resident(&mut self, filenames: &[String], catalogue: &mut FileCatalogue, now: chrono::NaiveDateTime) {
        for name in filenames {
            let Some(id) = catalogue.id_of(name) else {
                continue;
            };
            let size = catalogue.info(id).map(|i| i.size).unwrap_or(0);
            if self.cur_size + size > self.limit_size {
                continue;
            }
            if self.contents.insert(id) {
                self.cur_size += size;
            }
        }
        self.pushed_t = Some(now);
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.contents.contains(&file_id)
    }

    fn free_space(
        &mut self,
        needed: i64,
        delete_ranker: &DeleteRanker,
        hit_ranker: &HitRanker,
        now: chrono::NaiveDateTime,
        catalogue: &FileCatalogue,
    ) {
        let victims = delete_ranker.deletable(hit_ranker, &self.contents, needed, now, catalogue);
        for f in victims {
            if self.contents.remove(&f) {
                self.cur_size -= catalogue.info(f).map(|i| i.size).unwrap_or(0);
                debug!(file = f, "file-base evicted file");
            }
        }
    }

    /// Drains deliver events up to `now`. Registers previously unseen
    /// files into `catalogue` and admits them directly, bypassing the
    /// popularity ranker entirely.
    pub fn process_deliver(
        &mut self,
        now: chrono::NaiveDateTime,
        delete_ranker: &DeleteRanker,
        hit_ranker: &HitRanker,
        catalogue: &mut FileCatalogue,
    ) {
        while self.deliver_cursor < self.deliver.len() && self.deliver[self.deliver_cursor].time <= now {
            let ev = self.deliver[self.deliver_cursor].clone();
            self.deliver_cursor += 1;

            let id = catalogue.id_for(&ev.filename, ev.filesize, 0, ev.time);
            if self.contents.contains(&id) {
                continue;
            }
            if self.cur_size + ev.filesize > self.limit_size {
                self.free_space(
                    self.cur_size + ev.filesize - self.limit_size,
                    delete_ranker,
                    hit_ranker,
                    now,
                    catalogue,
                );
            }
            self.contents.insert(id);
            self.cur_size += ev.filesize;
            debug!(file = %ev.filename, "file-base delivered file");
        }
    }

    /// Drains purge events up to `now`, unconditionally removing the
    /// named file from `contents` if present.
    pub fn process_purge(&mut self, now: chrono::NaiveDateTime, catalogue: &FileCatalogue) {
        while self.purge_cursor < self.purge.len() && self.purge[self.purge_cursor].time <= now {
            let ev = &self.purge[self.purge_cursor];
            if let Some(id) = catalogue.id_of(&ev.filename) {
                if self.contents.remove(&id) {
                    self.cur_size -= catalogue.info(id).map(|i| i.size).unwrap_or(0);
                    debug!(file = %ev.filename, "file-base purged file");
                }
            }
            self.purge_cursor += 1;
        }
    }

    fn is_dawn(now: chrono::NaiveDateTime) -> bool {
        use chrono::Timelike;
        let h = now.hour();
        (DAWN_START_HOUR..DAWN_END_HOUR).contains(&h)
    }

    /// Runs one push-cycle tick if `now` has crossed the next scheduled
    /// push boundary, per spec.md §4.6.
    pub fn tick(
        &mut self,
        now: chrono::NaiveDateTime,
        hit_ranker: &HitRanker,
        delete_ranker: &DeleteRanker,
        catalogue: &FileCatalogue,
    ) {
        let Some(pushed_t) = self.pushed_t else {
            self.pushed_t = Some(now);
            return;
        };
        let period = if Self::is_dawn(now) {
            self.cfg.push_period_secs * self.cfg.dawn_push_n as i64
        } else {
            self.cfg.push_period_secs
        };
        if (now - pushed_t).num_seconds() < period {
            return;
        }
        self.pushed_t = Some(now);

        if self.pushing_queue.len() >= self.cfg.push_delay_n {
            if let Some(f) = self.pushing_queue.pop_front() {
                let size = catalogue.info(f).map(|i| i.size).unwrap_or(0);
                if self.cur_size + size > self.limit_size {
                    self.free_space(self.cur_size + size - self.limit_size, delete_ranker, hit_ranker, now, catalogue);
                }
                self.contents.insert(f);
                self.cur_size += size;
                debug!(file = f, "file-base installed pushed file");
            }
        }

        let pending: HashSet<FileId> = self.pushing_queue.iter().copied().collect();
        let Ok(candidate) = hit_ranker.addable(&self.contents, self.limit_size, &pending, catalogue) else {
            return;
        };
        let size = catalogue.info(candidate).map(|i| i.size).unwrap_or(0);
        if self.cur_size + size > self.limit_size {
            self.free_space(self.cur_size + size - self.limit_size, delete_ranker, hit_ranker, now, catalogue);
        }
        self.pushing_queue.push_back(candidate);
        debug!(file = candidate, "file-base queued file for push");
    }

    pub fn cur_size(&self) -> i64 {
        self.cur_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::FileInfo;
    use crate::config::RankerConfig;
    use chrono::NaiveDate;

    fn t(d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d as i32).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn purge_removes_resident_file() {
        let mut cat = FileCatalogue::new();
        cat.register(FileInfo {
            id: 1,
            filename: "a.mpg".into(),
            size: 10,
            bitrate: 1000,
            register_time: t(1, 0),
        });
        let mut fb = FileBaseStorage::new(
            100,
            FileBaseConfig::default(),
            vec![],
            vec![PurgeEvent { time: t(1, 1), filename: "a.mpg".into() }],
        );
        fb.seed_resident(&["a.mpg".to_string()], &mut cat, t(1, 0));
        assert!(fb.contains(1));
        fb.process_purge(t(1, 2), &cat);
        assert!(!fb.contains(1));
    }

    #[test]
    fn deliver_registers_and_admits_new_file() {
        let mut cat = FileCatalogue::new();
        let mut fb = FileBaseStorage::new(
            100,
            FileBaseConfig::default(),
            vec![DeliverEvent { time: t(1, 1), filename: "new.mpg".into(), filesize: 20 }],
            vec![],
        );
        let ranker = HitRanker::new(RankerConfig::default());
        let dr = DeleteRanker::SameAsHit;
        fb.process_deliver(t(1, 2), &dr, &ranker, &mut cat);
        assert!(cat.exists("new.mpg"));
        let id = cat.id_of("new.mpg").unwrap();
        assert!(fb.contains(id));
        assert_eq!(fb.cur_size(), 20);
    }

    #[test]
    fn dawn_tick_uses_multiplied_period() {
        let cat = FileCatalogue::new();
        let mut fb = FileBaseStorage::new(100, FileBaseConfig { push_period_secs: 300, push_delay_n: 2, dawn_push_n: 4, stat_window_for_del_secs: None, use_delete_lru: false }, vec![], vec![]);
        let ranker = HitRanker::new(RankerConfig::default());
        let dr = DeleteRanker::SameAsHit;
        fb.tick(t(1, 4), &ranker, &dr, &cat); // anchors pushed_t
        // 300s later, still inside dawn multiplier window (1200s), so no-op.
        fb.tick(t(1, 4) + chrono::Duration::seconds(300), &ranker, &dr, &cat);
        assert!(fb.pushing_queue.is_empty());
    }
}
