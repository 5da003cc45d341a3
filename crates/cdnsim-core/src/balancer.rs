//! C8: load balancer. Composes the selector (C5), per-VOD caches (C2), VOD
//! accounts (C3), and — for the file-base policy — the placement engine
//! (C7) behind one uniform interface the event engine drives.
//!
//! Grounded on `original_source/lb/lb.go` plus `filebaselb.go`/`legacy.go`;
//! those three Go structs are unified behind a single Rust type switching on
//! `SelectorKind` rather than kept as separate implementations, since the
//! difference between them is a handful of branches, not distinct state.

use std::collections::HashMap;

use tracing::warn;

use crate::catalogue::FileCatalogue;
use crate::config::{Config, FileBaseConfig, HighLowConfig, RankerConfig, SelectorKind};
use crate::error::{BalancerError, SelectError};
use crate::filebase::{DeleteRanker, DeliverEvent, FileBaseStorage, PurgeEvent};
use crate::ranker::{DeleteLruRanker, HitRanker};
use crate::selector::Selector;
use crate::types::{ChunkEvent, FileId, SessionEvent, VodKey};
use crate::vod::VodAccount;

use crate::cache::Cache;

pub struct LoadBalancer {
    kind: SelectorKind,
    selector: Selector,
    vods: HashMap<VodKey, VodAccount>,
    caches: HashMap<VodKey, Cache>,
    bindings: HashMap<String, VodKey>,
    filebase: Option<FileBaseStorage>,
    hit_ranker: Option<HitRanker>,
    delete_ranker: Option<DeleteRanker>,
    /// `Legacy`/`FileBase` chunk accounting. Both policies bypass the
    /// per-VOD `Cache`'s LRU entirely (`original_source/lb/legacy.go`,
    /// `filebaselb.go` each keep their own `HitCount`/`MissCount`/`OriginBps`
    /// on the `LoadBalancer` struct itself); since the two kinds are
    /// mutually exclusive for the life of a run, one set of counters serves
    /// both.
    lb_hit_count: i64,
    lb_miss_count: i64,
    lb_origin_bps: i64,
}

impl LoadBalancer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: SelectorKind,
        cfg: &Config,
        ranker_cfg: RankerConfig,
        fb_cfg: FileBaseConfig,
        hl_cfg: HighLowConfig,
        deliver: Vec<DeliverEvent>,
        purge: Vec<PurgeEvent>,
    ) -> Result<Self, SelectError> {
        let selector = Selector::new(kind, cfg, hl_cfg)?;
        let mut vods = HashMap::new();
        let mut caches = HashMap::new();
        for v in &cfg.vods {
            vods.insert(v.key(), VodAccount::new(v.limit_session, v.limit_bps));
            caches.insert(v.key(), Cache::new(v.storage_size));
        }

        let (filebase, hit_ranker, delete_ranker) = if matches!(kind, SelectorKind::FileBase) {
            let sole = &cfg.vods[0];
            let fb = FileBaseStorage::new(sole.storage_size, fb_cfg, deliver, purge);
            let hr = HitRanker::new(ranker_cfg);
            let dr = if fb_cfg_uses_lru(&fb_cfg) {
                DeleteRanker::Lru(DeleteLruRanker::new())
            } else {
                DeleteRanker::SameAsHit
            };
            (Some(fb), Some(hr), Some(dr))
        } else {
            (None, None, None)
        };

        Ok(Self {
            kind,
            selector,
            vods,
            caches,
            bindings: HashMap::new(),
            filebase,
            hit_ranker,
            delete_ranker,
            lb_hit_count: 0,
            lb_miss_count: 0,
            lb_origin_bps: 0,
        })
    }

    fn sole_vod_key(&self) -> VodKey {
        self.vods.keys().next().cloned().expect("at least one vod")
    }

    /// Seeds the file-base store's initial resident content from the
    /// "hitcount history" text listing (spec.md §4.12). A no-op unless the
    /// file-base selector is active.
    pub fn seed_filebase_resident(&mut self, filenames: &[String], catalogue: &mut FileCatalogue, now: chrono::NaiveDateTime) {
        if let Some(fb) = self.filebase.as_mut() {
            fb.seed_resident(filenames, catalogue, now);
        }
    }

    /// Advances file-base placement state: drains deliver/purge streams and
    /// runs the push-cycle tick if due. A no-op unless the file-base
    /// selector is active.
    pub fn on_time_advance(&mut self, now: chrono::NaiveDateTime, catalogue: &mut FileCatalogue) {
        let (Some(fb), Some(hr), Some(dr)) = (
            self.filebase.as_mut(),
            self.hit_ranker.as_ref(),
            self.delete_ranker.as_ref(),
        ) else {
            return;
        };
        fb.process_deliver(now, dr, hr, catalogue);
        fb.process_purge(now, catalogue);
        fb.tick(now, hr, dr, catalogue);
    }

    pub fn start_session(&mut self, evt: &SessionEvent) -> Result<(), BalancerError> {
        if matches!(self.kind, SelectorKind::FileBase) {
            let resident = self.filebase.as_ref().map(|fb| fb.contains(evt.file_id)).unwrap_or(false);
            if !resident {
                let sole = self.sole_vod_key();
                if let Some(acct) = self.vods.get_mut(&sole) {
                    acct.hit_fail();
                }
                warn!(sid = %evt.sid, filename = %evt.filename, "file-base miss, session dropped");
                return Ok(());
            }
        }

        let key = match self.selector.select(evt, &self.vods) {
            Ok(k) => k,
            Err(e) => {
                warn!(sid = %evt.sid, filename = %evt.filename, error = %e, "selection failed, session dropped");
                return Ok(());
            }
        };

        let acct = self
            .vods
            .get_mut(&key)
            .ok_or_else(|| BalancerError::UnknownVod(key.clone()))?;
        if let Err(reason) = acct.start_session(evt) {
            warn!(sid = %evt.sid, vod = %key, reason, "vod rejected session, dropped");
            return Ok(());
        }

        self.bindings.insert(evt.sid.clone(), key);
        if let Some(hr) = self.hit_ranker.as_mut() {
            hr.on_session_start(evt);
        }
        if let Some(dr) = self.delete_ranker.as_mut() {
            dr.on_session_start(evt);
        }
        Ok(())
    }

    pub fn end_session(
        &mut self,
        evt: &SessionEvent,
        end_time: chrono::NaiveDateTime,
        file_size: Option<i64>,
    ) -> Result<(), BalancerError> {
        match self.bindings.remove(&evt.sid) {
            Some(key) => {
                if let Some(acct) = self.vods.get_mut(&key) {
                    acct.end_session(evt);
                }
                self.selector.on_session_end(evt);
                if let Some(hr) = self.hit_ranker.as_mut() {
                    hr.on_session_end(evt, end_time, file_size);
                }
                Ok(())
            }
            None if matches!(self.kind, SelectorKind::FileBase) => Ok(()),
            None => Err(BalancerError::UnknownSession(evt.sid.clone())),
        }
    }

    pub fn start_chunk(&mut self, evt: &ChunkEvent) -> Result<bool, BalancerError> {
        if matches!(self.kind, SelectorKind::Legacy) {
            if evt.is_center {
                self.lb_miss_count += 1;
                self.lb_origin_bps += evt.bps;
            } else {
                self.lb_hit_count += 1;
            }
            return Ok(evt.is_center);
        }
        if matches!(self.kind, SelectorKind::FileBase) {
            // A session that missed at `start_session` (file not resident)
            // has no `bindings` entry; its chunks are counted as misses
            // rather than rejected, mirroring `filebaselb.go`'s `StartChunk`.
            let bound = self.bindings.contains_key(&evt.sid);
            if bound {
                self.lb_hit_count += 1;
            } else {
                self.lb_miss_count += 1;
                self.lb_origin_bps += evt.bps;
            }
            return Ok(!bound);
        }
        let key = self
            .bindings
            .get(&evt.sid)
            .cloned()
            .ok_or_else(|| BalancerError::UnknownSession(evt.sid.clone()))?;
        let cache = self
            .caches
            .get_mut(&key)
            .ok_or_else(|| BalancerError::UnknownVod(key.clone()))?;
        Ok(cache.start_chunk(evt)?)
    }

    pub fn end_chunk(&mut self, evt: &ChunkEvent, use_origin: bool) -> Result<(), BalancerError> {
        if matches!(self.kind, SelectorKind::Legacy | SelectorKind::FileBase) {
            if use_origin {
                self.lb_origin_bps -= evt.bps;
            }
            return Ok(());
        }
        let key = self
            .bindings
            .get(&evt.sid)
            .cloned()
            .ok_or_else(|| BalancerError::UnknownSession(evt.sid.clone()))?;
        let cache = self
            .caches
            .get_mut(&key)
            .ok_or_else(|| BalancerError::UnknownVod(key.clone()))?;
        cache.end_chunk(evt, use_origin);
        Ok(())
    }

    /// `Legacy`/`FileBase` hit/miss/origin-bps counters, read by `status.rs`
    /// in place of `Cache`'s (permanently zero) counters for those kinds.
    pub fn lb_counters(&self) -> (i64, i64, i64) {
        (self.lb_hit_count, self.lb_miss_count, self.lb_origin_bps)
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn vods(&self) -> &HashMap<VodKey, VodAccount> {
        &self.vods
    }

    pub fn caches(&self) -> &HashMap<VodKey, Cache> {
        &self.caches
    }

    pub fn all_cache_full(&self) -> bool {
        !self.caches.is_empty() && self.caches.values().all(|c| c.is_cache_full)
    }

    pub fn unbind_file(&mut self, _file_id: FileId) {}
}

fn fb_cfg_uses_lru(cfg: &FileBaseConfig) -> bool {
    cfg.use_delete_lru
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VodConfig;
    use chrono::NaiveDate;

    fn cfg() -> Config {
        Config {
            hit_reset_times: vec![],
            vods: vec![VodConfig {
                vodid: "v1".into(),
                storage_size: 1000,
                limit_session: 10,
                limit_bps: 1_000_000,
            }],
        }
    }

    fn evt(sid: &str, bps: i64) -> SessionEvent {
        SessionEvent {
            time: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            sid: sid.into(),
            filename: "a.mpg".into(),
            file_id: 1,
            bps,
            duration_secs: 10,
        }
    }

    fn chunk(sid: &str, bps: i64, is_center: bool) -> ChunkEvent {
        ChunkEvent {
            time: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            sid: sid.into(),
            filename: "a.mpg".into(),
            file_id: 1,
            bps,
            index: 0,
            chunk_size: 10,
            bypass: false,
            is_center,
        }
    }

    #[test]
    fn start_then_end_session_roundtrips() {
        let mut lb = LoadBalancer::new(
            SelectorKind::SameHashingWeight,
            &cfg(),
            RankerConfig::default(),
            FileBaseConfig::default(),
            HighLowConfig::default(),
            vec![],
            vec![],
        )
        .unwrap();
        let e = evt("s1", 100);
        lb.start_session(&e).unwrap();
        assert_eq!(lb.vods().get(&VodKey::from("v1")).unwrap().cur_session_count, 1);
        lb.end_session(&e, e.time, None).unwrap();
        assert_eq!(lb.vods().get(&VodKey::from("v1")).unwrap().cur_session_count, 0);
    }

    #[test]
    fn end_session_for_unknown_sid_is_fatal_outside_filebase() {
        let mut lb = LoadBalancer::new(
            SelectorKind::SameHashingWeight,
            &cfg(),
            RankerConfig::default(),
            FileBaseConfig::default(),
            HighLowConfig::default(),
            vec![],
            vec![],
        )
        .unwrap();
        let e = evt("ghost", 100);
        assert!(matches!(lb.end_session(&e, e.time, None), Err(BalancerError::UnknownSession(_))));
    }

    #[test]
    fn legacy_chunk_classification_bypasses_cache() {
        let mut lb = LoadBalancer::new(
            SelectorKind::Legacy,
            &cfg(),
            RankerConfig::default(),
            FileBaseConfig::default(),
            HighLowConfig::default(),
            vec![],
            vec![],
        )
        .unwrap();
        let c = chunk("s1", 100, true);
        assert_eq!(lb.start_chunk(&c).unwrap(), true);
    }

    #[test]
    fn legacy_chunk_counts_hit_and_miss_without_bindings() {
        let mut lb = LoadBalancer::new(
            SelectorKind::Legacy,
            &cfg(),
            RankerConfig::default(),
            FileBaseConfig::default(),
            HighLowConfig::default(),
            vec![],
            vec![],
        )
        .unwrap();
        let miss = chunk("s1", 100, true);
        let use_origin = lb.start_chunk(&miss).unwrap();
        assert!(use_origin);
        lb.end_chunk(&miss, use_origin).unwrap();

        let hit = chunk("s1", 50, false);
        let use_origin2 = lb.start_chunk(&hit).unwrap();
        assert!(!use_origin2);

        let (hit_count, miss_count, origin_bps) = lb.lb_counters();
        assert_eq!(hit_count, 1);
        assert_eq!(miss_count, 1);
        assert_eq!(origin_bps, 0);
    }

    // A file-base session that missed at start (file not resident) must not
    // abort the run on its first chunk event; its chunks count as misses.
    #[test]
    fn filebase_unbound_chunk_is_counted_as_miss_not_fatal() {
        let mut lb = LoadBalancer::new(
            SelectorKind::FileBase,
            &cfg(),
            RankerConfig::default(),
            FileBaseConfig::default(),
            HighLowConfig::default(),
            vec![],
            vec![],
        )
        .unwrap();
        let e = evt("s1", 100);
        lb.start_session(&e).unwrap(); // nothing seeded resident, dropped silently

        let c = chunk("s1", 100, false);
        let use_origin = lb.start_chunk(&c).unwrap();
        assert!(use_origin);
        lb.end_chunk(&c, use_origin).unwrap();

        let (hit_count, miss_count, origin_bps) = lb.lb_counters();
        assert_eq!(hit_count, 0);
        assert_eq!(miss_count, 1);
        assert_eq!(origin_bps, 0);
    }
}
