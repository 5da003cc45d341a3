//! C3: VOD resource account. Tracks concurrent session count and aggregate
//! bitrate against configured caps.
//!
//! Grounded on `original_source/lb/vod/vod.go`.

use crate::types::SessionEvent;

#[derive(Clone, Copy, Debug, Default)]
pub struct VodAccount {
    pub cur_session_count: i64,
    pub limit_session_count: i64,
    pub cur_bps: i64,
    pub limit_bps: i64,
    pub total_session_count: i64,
    pub hit_session_count: i64,
}

impl VodAccount {
    pub fn new(limit_session_count: i64, limit_bps: i64) -> Self {
        Self {
            limit_session_count,
            limit_bps,
            ..Default::default()
        }
    }

    /// Whether the account has room for one more session adding `add_bps`.
    pub fn available(&self, add_bps: i64) -> bool {
        self.cur_session_count + 1 <= self.limit_session_count
            && self.cur_bps + add_bps <= self.limit_bps
    }

    /// A session was attempted against this VOD but rejected by file-base
    /// selection before a session was actually opened here. Still counts
    /// toward the total, per the original's `HitFail`.
    pub fn hit_fail(&mut self) {
        self.total_session_count += 1;
    }

    pub fn start_session(&mut self, evt: &SessionEvent) -> Result<(), String> {
        if self.cur_session_count + 1 > self.limit_session_count {
            return Err(format!(
                "reaches limit session count, cur({}) limit({})",
                self.cur_session_count, self.limit_session_count
            ));
        }
        if self.cur_bps + evt.bps > self.limit_bps {
            return Err(format!(
                "reaches limit bps, cur({}) limit({})",
                self.cur_bps, self.limit_bps
            ));
        }
        self.cur_session_count += 1;
        self.cur_bps += evt.bps;
        self.total_session_count += 1;
        self.hit_session_count += 1;
        Ok(())
    }

    pub fn end_session(&mut self, evt: &SessionEvent) {
        self.cur_session_count -= 1;
        self.cur_bps -= evt.bps;
    }
}
