//! C6: sliding time-window popularity ranker.
//!
//! Grounded on `original_source/lb/ranker.go`. The slot vector, shift
//! semantics, and hit-weight formula follow spec.md §3/§4.5; there is no
//! surviving Go source for the exact empty-slot imputation arithmetic, so
//! that step is implemented from the prose contract and called out in
//! DESIGN.md.

use std::collections::{HashMap, HashSet};

use crate::catalogue::FileCatalogue;
use crate::config::RankerConfig;
use crate::error::RankerError;
use crate::types::{FileId, SessionEvent};

const LRU_SENTINEL_YEAR: i32 = 2001;

fn sentinel_epoch() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(LRU_SENTINEL_YEAR, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Sliding-window hit-weight and hit-count slots shared by both ranker
/// flavors below.
struct Slots {
    n: usize,
    shift_period_secs: i64,
    weight: Vec<HashMap<FileId, i64>>,
    count: Vec<HashMap<FileId, i64>>,
    last_shift: Option<chrono::NaiveDateTime>,
}

impl Slots {
    fn new(cfg: &RankerConfig) -> Self {
        let n = ((cfg.stat_window_secs / cfg.shift_period_secs).max(1)) as usize;
        Self {
            n,
            shift_period_secs: cfg.shift_period_secs,
            weight: vec![HashMap::new(); n],
            count: vec![HashMap::new(); n],
            last_shift: None,
        }
    }

    /// Advances the window so that `now` falls in the live (last) slot.
    fn shift_to(&mut self, now: chrono::NaiveDateTime) {
        match self.last_shift {
            None => self.last_shift = Some(now),
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                if elapsed >= self.shift_period_secs {
                    let shift_count =
                        ((elapsed / self.shift_period_secs) as usize).min(self.n);
                    self.weight.rotate_left(shift_count);
                    self.count.rotate_left(shift_count);
                    for s in self.weight.iter_mut().rev().take(shift_count) {
                        s.clear();
                    }
                    for s in self.count.iter_mut().rev().take(shift_count) {
                        s.clear();
                    }
                    self.last_shift = Some(now);
                }
            }
        }
    }

    fn add(&mut self, file_id: FileId, weight: i64, now: chrono::NaiveDateTime) {
        self.shift_to(now);
        *self.weight[self.n - 1].entry(file_id).or_insert(0) += weight;
        *self.count[self.n - 1].entry(file_id).or_insert(0) += 1;
    }

    fn window_start(&self) -> Option<chrono::NaiveDateTime> {
        self.last_shift
            .map(|last| last - chrono::Duration::seconds(self.shift_period_secs * (self.n as i64 - 1)))
    }

    fn raw_hit(&self, file_id: FileId, use_time_weight: bool) -> i64 {
        if use_time_weight {
            let mut sum = 0.0;
            for (i, slot) in self.weight.iter().enumerate() {
                let w = *slot.get(&file_id).unwrap_or(&0) as f64;
                let decay = 0.9_f64.powi((self.n - i - 1) as i32);
                sum += w * decay;
            }
            sum as i64
        } else {
            self.weight.iter().map(|s| *s.get(&file_id).unwrap_or(&0)).sum()
        }
    }

    fn has_any_slot(&self, file_id: FileId) -> bool {
        self.weight.iter().any(|s| s.contains_key(&file_id))
    }

    fn known_files(&self) -> HashSet<FileId> {
        self.weight.iter().flat_map(|s| s.keys().copied()).collect()
    }

    /// Scales a raw sum up to account for slots that predate the file's
    /// registration, per spec.md §4.5's empty-slot imputation.
    fn imputed_hit(&self, file_id: FileId, register_time: chrono::NaiveDateTime, use_time_weight: bool) -> i64 {
        let sum = self.raw_hit(file_id, use_time_weight);
        let Some(window_start) = self.window_start() else {
            return sum;
        };
        if register_time <= window_start {
            return sum;
        }
        let elapsed = (register_time - window_start).num_seconds().max(0);
        let empty_slots = ((elapsed / self.shift_period_secs) as usize).min(self.n);
        if empty_slots == 0 || empty_slots >= self.n {
            return sum;
        }
        let denom = (self.n - empty_slots) as f64;
        sum + ((sum as f64) * empty_slots as f64 / denom) as i64
    }
}

/// Computes the per-session weight contribution and when it applies, per
/// spec.md §4.5.
fn session_weight(cfg: &RankerConfig, bps: i64) -> i64 {
    if cfg.use_file_size {
        bps
    } else {
        bps / 100_000
    }
}

fn applies_at_end(cfg: &RankerConfig) -> bool {
    cfg.use_session_duration || cfg.use_file_size
}

/// Popularity ranker driving file-base push/delete decisions.
pub struct HitRanker {
    cfg: RankerConfig,
    slots: Slots,
}

impl HitRanker {
    pub fn new(cfg: RankerConfig) -> Self {
        Self {
            slots: Slots::new(&cfg),
            cfg,
        }
    }

    pub fn on_session_start(&mut self, evt: &SessionEvent) {
        self.slots.shift_to(evt.time);
        if applies_at_end(&self.cfg) {
            return;
        }
        let w = session_weight(&self.cfg, evt.bps);
        self.slots.add(evt.file_id, w, evt.time);
    }

    pub fn on_session_end(&mut self, evt: &SessionEvent, end_time: chrono::NaiveDateTime, file_size: Option<i64>) {
        if !applies_at_end(&self.cfg) {
            return;
        }
        let mut w = session_weight(&self.cfg, evt.bps) * evt.duration_secs;
        if self.cfg.use_file_size {
            if let Some(size) = file_size {
                if size > 0 {
                    w /= size;
                }
            }
        }
        self.slots.add(evt.file_id, w, end_time);
    }

    pub fn hit(&self, file_id: FileId, catalogue: &FileCatalogue) -> i64 {
        match catalogue.info(file_id) {
            Some(info) => self.slots.imputed_hit(file_id, info.register_time, self.cfg.use_time_weight),
            None => self.slots.raw_hit(file_id, self.cfg.use_time_weight),
        }
    }

    /// All files with at least one non-zero slot, excluding `exclude`,
    /// ranked by `hit` descending and tie-broken by registration time
    /// descending (newer first).
    pub fn hit_list(&self, exclude: &HashSet<FileId>, catalogue: &FileCatalogue) -> Vec<FileId> {
        let mut files: Vec<FileId> = self
            .slots
            .known_files()
            .into_iter()
            .filter(|f| !exclude.contains(f) && self.slots.has_any_slot(*f))
            .collect();
        files.sort_by(|a, b| {
            let hit_a = self.hit(*a, catalogue);
            let hit_b = self.hit(*b, catalogue);
            hit_b.cmp(&hit_a).then_with(|| {
                let ra = catalogue.info(*b).map(|i| i.register_time);
                let rb = catalogue.info(*a).map(|i| i.register_time);
                ra.cmp(&rb)
            })
        });
        files
    }

    /// The first ranked file not already in `current` whose cumulative
    /// size (together with all ranked files before it) fits under `cap`.
    pub fn addable(
        &self,
        current: &HashSet<FileId>,
        cap: i64,
        exclude: &HashSet<FileId>,
        catalogue: &FileCatalogue,
    ) -> Result<FileId, RankerError> {
        let mut cumulative = 0i64;
        for f in self.hit_list(exclude, catalogue) {
            let size = catalogue.info(f).map(|i| i.size).unwrap_or(0);
            cumulative += size;
            if cumulative > cap {
                break;
            }
            if !current.contains(&f) {
                return Ok(f);
            }
        }
        Err(RankerError::NotExistsAddable)
    }

    /// Resident files to evict to free at least `min_free_bytes`, coldest
    /// first, skipping anything registered within the last 24 hours.
    pub fn deletable(
        &self,
        current: &HashSet<FileId>,
        min_free_bytes: i64,
        now: chrono::NaiveDateTime,
        catalogue: &FileCatalogue,
    ) -> Vec<FileId> {
        deletable_by(current, min_free_bytes, catalogue, |f| {
            let info = catalogue.info(f)?;
            if now - info.register_time < chrono::Duration::hours(24) {
                return None;
            }
            Some((self.hit(f, catalogue), info.register_time))
        })
    }
}

/// Shared tail-eviction walk used by both ranker flavors: sorts resident
/// files by `(hit, tiebreak)` ascending (coldest first) and accumulates
/// until `min_free_bytes` is reached.
fn deletable_by(
    current: &HashSet<FileId>,
    min_free_bytes: i64,
    catalogue: &FileCatalogue,
    rank_of: impl Fn(FileId) -> Option<(i64, chrono::NaiveDateTime)>,
) -> Vec<FileId> {
    let mut candidates: Vec<(FileId, i64, chrono::NaiveDateTime)> = current
        .iter()
        .filter_map(|&f| rank_of(f).map(|(h, t)| (f, h, t)))
        .collect();
    // Hottest/newest first, so draining from the back hits the coldest.
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.2.cmp(&a.2)));

    let mut freed = 0i64;
    let mut out = Vec::new();
    while freed < min_free_bytes {
        let Some((f, _, _)) = candidates.pop() else {
            break;
        };
        freed += catalogue.info(f).map(|i| i.size).unwrap_or(0);
        out.push(f);
    }
    out
}

/// Alternative deletion ranker using last-session-activity recency
/// instead of registration order. Grounded on `lb/ranker.go`'s
/// `DeleteLruRanker`.
pub struct DeleteLruRanker {
    recent_session_time: HashMap<FileId, chrono::NaiveDateTime>,
}

impl DeleteLruRanker {
    pub fn new() -> Self {
        Self {
            recent_session_time: HashMap::new(),
        }
    }

    pub fn on_session_start(&mut self, evt: &SessionEvent) {
        self.recent_session_time.insert(evt.file_id, evt.time);
    }

    fn recency(&self, file_id: FileId) -> chrono::NaiveDateTime {
        self.recent_session_time
            .get(&file_id)
            .copied()
            .unwrap_or_else(sentinel_epoch)
    }

    pub fn deletable(
        &self,
        current: &HashSet<FileId>,
        min_free_bytes: i64,
        now: chrono::NaiveDateTime,
        catalogue: &FileCatalogue,
    ) -> Vec<FileId> {
        deletable_by(current, min_free_bytes, catalogue, |f| {
            let info = catalogue.info(f)?;
            if now - info.register_time < chrono::Duration::hours(24) {
                return None;
            }
            Some((0, self.recency(f)))
        })
    }
}

impl Default for DeleteLruRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::FileInfo;
    use chrono::NaiveDate;

    fn t(h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn catalogue_with(files: &[(FileId, &str, i64, chrono::NaiveDateTime)]) -> FileCatalogue {
        let mut cat = FileCatalogue::new();
        for &(id, name, size, reg) in files {
            cat.register(FileInfo {
                id,
                filename: name.into(),
                size,
                bitrate: 1_000_000,
                register_time: reg,
            });
        }
        cat
    }

    fn evt(file_id: FileId, bps: i64, time: chrono::NaiveDateTime) -> SessionEvent {
        SessionEvent {
            time,
            sid: "s".into(),
            filename: "f".into(),
            file_id,
            bps,
            duration_secs: 100,
        }
    }

    #[test]
    fn hit_list_ranks_by_weight_descending() {
        let cat = catalogue_with(&[(1, "a", 100, t(0)), (2, "b", 100, t(0))]);
        let mut r = HitRanker::new(RankerConfig::default());
        r.on_session_start(&evt(1, 10_000_000, t(1)));
        r.on_session_start(&evt(2, 1_000_000, t(1)));
        let list = r.hit_list(&HashSet::new(), &cat);
        assert_eq!(list, vec![1, 2]);
    }

    #[test]
    fn addable_skips_current_and_respects_cap() {
        let cat = catalogue_with(&[(1, "a", 50, t(0)), (2, "b", 50, t(0))]);
        let mut r = HitRanker::new(RankerConfig::default());
        r.on_session_start(&evt(1, 10_000_000, t(1)));
        r.on_session_start(&evt(2, 1_000_000, t(1)));
        let mut current = HashSet::new();
        current.insert(1);
        let picked = r.addable(&current, 100, &HashSet::new(), &cat).unwrap();
        assert_eq!(picked, 2);
    }

    #[test]
    fn addable_fails_when_nothing_qualifies() {
        let cat = FileCatalogue::new();
        let r = HitRanker::new(RankerConfig::default());
        assert!(matches!(
            r.addable(&HashSet::new(), 100, &HashSet::new(), &cat),
            Err(RankerError::NotExistsAddable)
        ));
    }

    #[test]
    fn deletable_skips_recently_registered_files() {
        let cat = catalogue_with(&[(1, "a", 100, t(0))]);
        let r = HitRanker::new(RankerConfig::default());
        let mut current = HashSet::new();
        current.insert(1);
        // Registered at t(0), "now" only an hour later: must be skipped.
        let list = r.deletable(&current, 50, t(1), &cat);
        assert!(list.is_empty());
    }

    #[test]
    fn lru_ranker_prefers_sentinel_epoch_for_untouched_files() {
        let cat = catalogue_with(&[
            (1, "a", 50, NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()),
            (2, "b", 50, NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()),
        ]);
        let mut r = DeleteLruRanker::new();
        r.on_session_start(&evt(2, 1_000_000, t(1)));
        let mut current = HashSet::new();
        current.insert(1);
        current.insert(2);
        // File 1 never had a session, so it sits at the sentinel epoch and
        // must be evicted before file 2.
        let list = r.deletable(&current, 1, t(5), &cat);
        assert_eq!(list.first(), Some(&1));
    }
}
