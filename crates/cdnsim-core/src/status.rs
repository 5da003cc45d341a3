//! C10: status snapshot and stat aggregator.
//!
//! Grounded on `original_source/status/status.go` and
//! `original_source/simul/statuswriter.go`. The concrete text/remote
//! writers (`StdStatusWriter`/`DBStatusWriter` in the original) live in
//! `cdnsim-cli` since one of them needs an HTTP client this crate does not
//! depend on; this module defines the data and the `StatusWriter` seam.

use std::collections::HashMap;

use crate::balancer::LoadBalancer;
use crate::config::SelectorKind;
use crate::types::VodKey;

#[derive(Clone, Debug, PartialEq)]
pub struct VodStatus {
    pub vodid: VodKey,
    pub cur_session: i64,
    pub limit_session: i64,
    pub cur_bps: i64,
    pub limit_bps: i64,
    pub hit: i64,
    pub miss: i64,
    pub disk: i64,
    pub disk_limit: i64,
}

/// Immutable snapshot of all per-VOD and aggregate counters at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub time: chrono::NaiveDateTime,
    pub vods: Vec<VodStatus>,
    pub origin_bps: i64,
    pub all_cache_full: bool,
}

impl Status {
    pub fn snapshot(lb: &LoadBalancer, now: chrono::NaiveDateTime) -> Self {
        let caches = lb.caches();
        // `Legacy`/`FileBase` bypass the per-VOD `Cache` entirely, so its
        // hit/miss/origin-bps counters stay at zero for those kinds; read
        // the load balancer's own counters instead (see `balancer.rs`).
        let uses_lb_counters = matches!(lb.kind(), SelectorKind::Legacy | SelectorKind::FileBase);
        let (lb_hit, lb_miss, lb_origin_bps) = lb.lb_counters();
        let mut vods: Vec<VodStatus> = lb
            .vods()
            .iter()
            .map(|(key, acct)| {
                let cache = caches.get(key);
                let (hit, miss) = if uses_lb_counters {
                    (lb_hit, lb_miss)
                } else {
                    (
                        cache.map(|c| c.hit_count).unwrap_or(0),
                        cache.map(|c| c.miss_count).unwrap_or(0),
                    )
                };
                VodStatus {
                    vodid: key.clone(),
                    cur_session: acct.cur_session_count,
                    limit_session: acct.limit_session_count,
                    cur_bps: acct.cur_bps,
                    limit_bps: acct.limit_bps,
                    hit,
                    miss,
                    disk: cache.map(|c| c.cur_size).unwrap_or(0),
                    disk_limit: cache.map(|c| c.limit_size).unwrap_or(0),
                }
            })
            .collect();
        vods.sort_by(|a, b| a.vodid.0.cmp(&b.vodid.0));
        let origin_bps = if uses_lb_counters {
            lb_origin_bps
        } else {
            caches.values().map(|c| c.origin_bps).sum()
        };
        Self {
            time: now,
            vods,
            origin_bps,
            all_cache_full: lb.all_cache_full(),
        }
    }
}

/// A single VOD's counters after reset-baseline subtraction, plus running
/// maxima.
#[derive(Clone, Debug, PartialEq)]
pub struct VodAggregate {
    pub vodid: VodKey,
    pub cur_session: i64,
    pub limit_session: i64,
    pub cur_bps: i64,
    pub limit_bps: i64,
    pub hit: i64,
    pub miss: i64,
    pub disk: i64,
    pub disk_limit: i64,
    pub max_bps_percent: f64,
    pub max_session_percent: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedStatus {
    pub time: chrono::NaiveDateTime,
    pub vods: Vec<VodAggregate>,
    pub origin_bps: i64,
    pub max_origin_bps: i64,
    pub all_cache_full: bool,
}

/// Tracks running maxima and hit/miss counter resets across the run.
/// Grounded on `status/status.go`'s aggregation pass.
pub struct StatusAggregator {
    hit_reset_times: Vec<chrono::NaiveDateTime>,
    next_reset_idx: usize,
    reset_base: HashMap<VodKey, (i64, i64)>,
    max_origin_bps: i64,
    max_bps_percent: HashMap<VodKey, f64>,
    max_session_percent: HashMap<VodKey, f64>,
    all_cache_full_reset_done: bool,
}

impl StatusAggregator {
    pub fn new(mut hit_reset_times: Vec<chrono::NaiveDateTime>) -> Self {
        hit_reset_times.sort();
        Self {
            hit_reset_times,
            next_reset_idx: 0,
            reset_base: HashMap::new(),
            max_origin_bps: 0,
            max_bps_percent: HashMap::new(),
            max_session_percent: HashMap::new(),
            all_cache_full_reset_done: false,
        }
    }

    fn reset_base_for(&self, key: &VodKey) -> (i64, i64) {
        self.reset_base.get(key).copied().unwrap_or((0, 0))
    }

    pub fn update(&mut self, status: &Status) -> AggregatedStatus {
        while self.next_reset_idx < self.hit_reset_times.len()
            && status.time >= self.hit_reset_times[self.next_reset_idx]
        {
            for v in &status.vods {
                self.reset_base.insert(v.vodid.clone(), (v.hit, v.miss));
            }
            self.next_reset_idx += 1;
        }
        if status.all_cache_full && !self.all_cache_full_reset_done {
            for v in &status.vods {
                self.reset_base.insert(v.vodid.clone(), (v.hit, v.miss));
            }
            self.all_cache_full_reset_done = true;
        }

        self.max_origin_bps = self.max_origin_bps.max(status.origin_bps);

        let vods = status
            .vods
            .iter()
            .map(|v| {
                let (hit_base, miss_base) = self.reset_base_for(&v.vodid);
                let bps_pct = if v.limit_bps > 0 {
                    v.cur_bps as f64 / v.limit_bps as f64
                } else {
                    0.0
                };
                let session_pct = if v.limit_session > 0 {
                    v.cur_session as f64 / v.limit_session as f64
                } else {
                    0.0
                };
                let max_bps = self
                    .max_bps_percent
                    .entry(v.vodid.clone())
                    .and_modify(|m| *m = m.max(bps_pct))
                    .or_insert(bps_pct);
                let max_session = self
                    .max_session_percent
                    .entry(v.vodid.clone())
                    .and_modify(|m| *m = m.max(session_pct))
                    .or_insert(session_pct);
                VodAggregate {
                    vodid: v.vodid.clone(),
                    cur_session: v.cur_session,
                    limit_session: v.limit_session,
                    cur_bps: v.cur_bps,
                    limit_bps: v.limit_bps,
                    hit: v.hit - hit_base,
                    miss: v.miss - miss_base,
                    disk: v.disk,
                    disk_limit: v.disk_limit,
                    max_bps_percent: *max_bps,
                    max_session_percent: *max_session,
                }
            })
            .collect();

        AggregatedStatus {
            time: status.time,
            vods,
            origin_bps: status.origin_bps,
            max_origin_bps: self.max_origin_bps,
            all_cache_full: status.all_cache_full,
        }
    }
}

/// A sink for periodic status reports. Implemented in `cdnsim-cli` by a
/// text writer and an HTTP line-protocol writer.
pub trait StatusWriter {
    fn write(&mut self, status: &AggregatedStatus) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
