//! C13/§6: human-readable status writer.
//!
//! Grounded on `original_source/simul/statuswriter.go`'s `StdStatusWriter`
//! (one line per VOD plus a run-wide aggregate line).

use std::io::Write;

use cdnsim_core::{AggregatedStatus, StatusWriter};

pub struct StdStatusWriter<W: Write> {
    out: W,
}

impl<W: Write> StdStatusWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> StatusWriter for StdStatusWriter<W> {
    fn write(&mut self, status: &AggregatedStatus) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        writeln!(self.out, "[{}] origin_bps={} (max {}) cache_full={}", status.time, status.origin_bps, status.max_origin_bps, status.all_cache_full)?;
        for v in &status.vods {
            writeln!(
                self.out,
                "  vod={:<12} session={}/{} bps={}/{} hit={} miss={} disk={}/{} max_bps%={:.2} max_session%={:.2}",
                v.vodid.to_string(),
                v.cur_session,
                v.limit_session,
                v.cur_bps,
                v.limit_bps,
                v.hit,
                v.miss,
                v.disk,
                v.disk_limit,
                v.max_bps_percent * 100.0,
                v.max_session_percent * 100.0,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdnsim_core::VodKey;
    use chrono::NaiveDate;

    #[test]
    fn writes_a_line_per_vod_plus_header() {
        let mut buf = Vec::new();
        {
            let mut w = StdStatusWriter::new(&mut buf);
            let status = AggregatedStatus {
                time: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                vods: vec![cdnsim_core::status::VodAggregate {
                    vodid: VodKey::from("v1"),
                    cur_session: 1,
                    limit_session: 10,
                    cur_bps: 100,
                    limit_bps: 1000,
                    hit: 5,
                    miss: 2,
                    disk: 10,
                    disk_limit: 100,
                    max_bps_percent: 0.1,
                    max_session_percent: 0.1,
                }],
                origin_bps: 50,
                max_origin_bps: 50,
                all_cache_full: false,
            };
            w.write(&status).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("vod=v1"));
    }
}
