//! C9: event engine. Merges the external session-record stream with
//! internally generated chunk/session-end events via a time-ordered
//! min-heap and drives them through the load balancer in strict time
//! order.
//!
//! Grounded on `original_source/simul/simulator.go`; `container/heap` there
//! becomes a `std::collections::BinaryHeap` wrapped for min-heap ordering
//! here.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use chrono::Duration;
use tracing::{error, info};

use crate::balancer::LoadBalancer;
use crate::catalogue::FileCatalogue;
use crate::error::BalancerError;
use crate::status::{AggregatedStatus, Status, StatusAggregator, StatusWriter};
use crate::types::{ChunkEvent, FileId, SessionEvent, SessionRecord, CHUNK_SIZE};

/// Duration, in milliseconds, to stream one chunk at `bps` bits/sec.
fn chunk_duration_ms(bps: i64) -> i64 {
    let bps = bps.max(1);
    (8 * CHUNK_SIZE * 1000 + bps - 1) / bps
}

#[derive(Clone, Debug)]
enum InternalEventKind {
    ChunkEnd {
        sid: String,
        filename: String,
        file_id: FileId,
        bps: i64,
        index: i64,
        bypass: bool,
        is_center: bool,
        use_origin: bool,
        session_end_time: chrono::NaiveDateTime,
    },
    SessionEnd {
        sid: String,
        filename: String,
        file_id: FileId,
        bps: i64,
        duration_secs: i64,
        filesize: Option<i64>,
    },
}

struct InternalEvent {
    time: chrono::NaiveDateTime,
    seq: u64,
    kind: InternalEventKind,
}

impl PartialEq for InternalEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for InternalEvent {}

// Reversed so `BinaryHeap` (a max-heap) pops the earliest time first. The
// `seq` tiebreak only makes same-timestamp ordering deterministic run to
// run; spec.md leaves the actual tiebreak unspecified.
impl Ord for InternalEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for InternalEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-file two-set structure flagging the first session of each file
/// within a rolling window as bypass traffic. Grounded on spec.md §4.9;
/// the original's equivalent has no surviving source in the pack.
struct FirstBypassFilter {
    period_secs: i64,
    period_start: Option<chrono::NaiveDateTime>,
    first_hit: HashSet<String>,
    more_hit: HashSet<String>,
}

impl FirstBypassFilter {
    fn new(period_secs: i64) -> Self {
        Self {
            period_secs,
            period_start: None,
            first_hit: HashSet::new(),
            more_hit: HashSet::new(),
        }
    }

    fn classify(&mut self, filename: &str, now: chrono::NaiveDateTime) -> bool {
        match self.period_start {
            None => self.period_start = Some(now),
            Some(start) if (now - start).num_seconds() >= self.period_secs => {
                self.first_hit.clear();
                self.more_hit.clear();
                self.period_start = Some(now);
            }
            _ => {}
        }
        if self.more_hit.contains(filename) {
            return false;
        }
        if self.first_hit.remove(filename) {
            self.more_hit.insert(filename.to_string());
            return false;
        }
        self.first_hit.insert(filename.to_string());
        true
    }
}

/// Runtime knobs for the engine that are not already captured by the load
/// balancer's own configuration.
pub struct EngineOptions {
    pub max_events: Option<u64>,
    pub start_time: Option<chrono::NaiveDateTime>,
    /// 0 means "log after every event".
    pub status_write_period_secs: i64,
    pub bypass_list: HashSet<String>,
    pub first_bypass_enabled: bool,
    pub first_bypass_period_secs: i64,
    pub hit_reset_times: Vec<chrono::NaiveDateTime>,
}

pub struct Engine<I: Iterator<Item = SessionRecord>> {
    records: std::iter::Peekable<I>,
    heap: BinaryHeap<InternalEvent>,
    seq: u64,
    catalogue: FileCatalogue,
    balancer: LoadBalancer,
    aggregator: StatusAggregator,
    writer: Option<Box<dyn StatusWriter>>,
    max_events: Option<u64>,
    event_count: u64,
    start_time: Option<chrono::NaiveDateTime>,
    status_write_period_secs: i64,
    next_log_time: Option<chrono::NaiveDateTime>,
    bypass_list: HashSet<String>,
    fb_filter: Option<FirstBypassFilter>,
}

impl<I: Iterator<Item = SessionRecord>> Engine<I> {
    pub fn new(
        records: I,
        catalogue: FileCatalogue,
        balancer: LoadBalancer,
        writer: Option<Box<dyn StatusWriter>>,
        opts: EngineOptions,
    ) -> Self {
        Self {
            records: records.peekable(),
            heap: BinaryHeap::new(),
            seq: 0,
            catalogue,
            balancer,
            aggregator: StatusAggregator::new(opts.hit_reset_times),
            writer,
            max_events: opts.max_events,
            event_count: 0,
            start_time: opts.start_time,
            status_write_period_secs: opts.status_write_period_secs,
            next_log_time: None,
            bypass_list: opts.bypass_list,
            fb_filter: if opts.first_bypass_enabled {
                Some(FirstBypassFilter::new(opts.first_bypass_period_secs))
            } else {
                None
            },
        }
    }

    pub fn catalogue(&self) -> &FileCatalogue {
        &self.catalogue
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    fn is_bypass(&mut self, filename: &str, now: chrono::NaiveDateTime) -> bool {
        if self.bypass_list.contains(filename) {
            return true;
        }
        match self.fb_filter.as_mut() {
            Some(f) => f.classify(filename, now),
            None => false,
        }
    }

    fn push_event(&mut self, time: chrono::NaiveDateTime, kind: InternalEventKind) {
        self.seq += 1;
        self.heap.push(InternalEvent { time, seq: self.seq, kind });
    }

    fn at_limit(&self) -> bool {
        matches!(self.max_events, Some(max) if self.event_count >= max)
    }

    fn emit_status(&mut self, now: chrono::NaiveDateTime) {
        let snap = Status::snapshot(&self.balancer, now);
        let agg: AggregatedStatus = self.aggregator.update(&snap);
        if let Some(w) = self.writer.as_mut() {
            if let Err(e) = w.write(&agg) {
                tracing::warn!(error = %e, "status write failed, dropped");
            }
        }
    }

    fn log_every_event(&mut self, now: chrono::NaiveDateTime) {
        if self.status_write_period_secs == 0 {
            self.emit_status(now);
        }
    }

    /// Checked once per external session start; advances the lazy logging
    /// boundary by whole periods, per spec.md §4.8.
    fn log_on_external_start(&mut self, now: chrono::NaiveDateTime) {
        if self.status_write_period_secs == 0 {
            return;
        }
        match self.next_log_time {
            None => {
                self.next_log_time = Some(now + Duration::seconds(self.status_write_period_secs));
                self.emit_status(now);
            }
            Some(next) if now >= next => {
                let mut boundary = next;
                while boundary <= now {
                    boundary += Duration::seconds(self.status_write_period_secs);
                }
                self.next_log_time = Some(boundary);
                self.emit_status(now);
            }
            _ => {}
        }
    }

    fn process_record(&mut self, rec: SessionRecord) -> Result<(), BalancerError> {
        if let Some(st) = self.start_time {
            if rec.started < st {
                return Ok(());
            }
        }
        let now = rec.started;
        self.balancer.on_time_advance(now, &mut self.catalogue);

        let file_id = self.catalogue.id_for(&rec.filename, rec.filesize.unwrap_or(0), rec.bandwidth, now);
        let bypass = self.is_bypass(&rec.filename, now);
        let bps = rec.bandwidth;
        let duration_secs = (rec.ended - rec.started).num_seconds().max(0);

        let session_start = SessionEvent {
            time: now,
            sid: rec.sid.clone(),
            filename: rec.filename.clone(),
            file_id,
            bps,
            duration_secs,
        };
        self.balancer.start_session(&session_start)?;
        self.event_count += 1;
        self.log_every_event(now);

        let index0 = rec.offset / CHUNK_SIZE;
        let chunk0 = ChunkEvent {
            time: now,
            sid: rec.sid.clone(),
            filename: rec.filename.clone(),
            file_id,
            bps,
            index: index0,
            chunk_size: CHUNK_SIZE,
            bypass,
            is_center: rec.is_center,
        };
        let use_origin = self.balancer.start_chunk(&chunk0)?;
        self.event_count += 1;
        self.log_every_event(now);

        let d_ms = chunk_duration_ms(bps);
        let chunk_end_time = std::cmp::min(now + Duration::milliseconds(d_ms), rec.ended - Duration::milliseconds(1));
        self.push_event(
            chunk_end_time,
            InternalEventKind::ChunkEnd {
                sid: rec.sid.clone(),
                filename: rec.filename.clone(),
                file_id,
                bps,
                index: index0,
                bypass,
                is_center: rec.is_center,
                use_origin,
                session_end_time: rec.ended,
            },
        );
        self.push_event(
            rec.ended,
            InternalEventKind::SessionEnd {
                sid: rec.sid,
                filename: rec.filename,
                file_id,
                bps,
                duration_secs,
                filesize: rec.filesize,
            },
        );

        self.log_on_external_start(now);
        Ok(())
    }

    fn drain_internal(&mut self, ev: InternalEvent) -> Result<(), BalancerError> {
        let now = ev.time;
        match ev.kind {
            InternalEventKind::ChunkEnd {
                sid,
                filename,
                file_id,
                bps,
                index,
                bypass,
                is_center,
                use_origin,
                session_end_time,
            } => {
                let chunk_evt = ChunkEvent {
                    time: now,
                    sid: sid.clone(),
                    filename: filename.clone(),
                    file_id,
                    bps,
                    index,
                    chunk_size: CHUNK_SIZE,
                    bypass,
                    is_center,
                };
                self.balancer.end_chunk(&chunk_evt, use_origin)?;
                self.event_count += 1;
                self.log_every_event(now);

                let is_last = now == session_end_time - Duration::milliseconds(1);
                if !is_last {
                    let next_index = index + 1;
                    let next_chunk = ChunkEvent {
                        time: now,
                        sid: sid.clone(),
                        filename: filename.clone(),
                        file_id,
                        bps,
                        index: next_index,
                        chunk_size: CHUNK_SIZE,
                        bypass,
                        is_center,
                    };
                    let next_use_origin = self.balancer.start_chunk(&next_chunk)?;
                    self.event_count += 1;
                    self.log_every_event(now);

                    let d_ms = chunk_duration_ms(bps);
                    let next_end = std::cmp::min(now + Duration::milliseconds(d_ms), session_end_time - Duration::milliseconds(1));
                    self.push_event(
                        next_end,
                        InternalEventKind::ChunkEnd {
                            sid,
                            filename,
                            file_id,
                            bps,
                            index: next_index,
                            bypass,
                            is_center,
                            use_origin: next_use_origin,
                            session_end_time,
                        },
                    );
                }
            }
            InternalEventKind::SessionEnd {
                sid,
                filename,
                file_id,
                bps,
                duration_secs,
                filesize,
            } => {
                let session_evt = SessionEvent {
                    time: now,
                    sid,
                    filename,
                    file_id,
                    bps,
                    duration_secs,
                };
                self.balancer.end_session(&session_evt, now, filesize)?;
                self.event_count += 1;
                self.log_every_event(now);
            }
        }
        Ok(())
    }

    /// Runs the simulation to completion (or until `max_events` is hit).
    /// A fatal error aborts the run; the caller decides how to report it.
    pub fn run(&mut self) -> Result<(), BalancerError> {
        loop {
            if self.at_limit() {
                info!(events = self.event_count, "event limit reached, stopping");
                break;
            }
            let next_rec_time = self.records.peek().map(|r| r.started);
            loop {
                if self.at_limit() {
                    break;
                }
                let should_drain = match (self.heap.peek(), next_rec_time) {
                    (Some(ev), Some(t)) => ev.time <= t,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if !should_drain {
                    break;
                }
                let ev = self.heap.pop().expect("peeked above");
                if let Err(e) = self.drain_internal(ev) {
                    error!(error = %e, "fatal engine error draining internal event");
                    return Err(e);
                }
            }
            match self.records.next() {
                Some(rec) => {
                    if let Err(e) = self.process_record(rec) {
                        error!(error = %e, "fatal engine error processing session record");
                        return Err(e);
                    }
                }
                None => break,
            }
        }

        while !self.at_limit() {
            let Some(ev) = self.heap.pop() else { break };
            if let Err(e) = self.drain_internal(ev) {
                error!(error = %e, "fatal engine error draining tail events");
                return Err(e);
            }
        }

        info!(events = self.event_count, "run complete");
        Ok(())
    }
}
