//! C13/§6: remote metric emission. HTTP POST in InfluxDB line-protocol
//! format, non-fatal on failure.
//!
//! Grounded on `original_source/simul/statuswriter.go`'s `DBStatusWriter`
//! (3s timeout, disabled keep-alives, expects HTTP 204). Uses `reqwest`'s
//! blocking client: the engine loop is single-threaded per spec.md §5, so a
//! blocking fire-and-forget POST per status tick avoids pulling a tokio
//! runtime into the binary for this alone.

use std::time::Duration;

use cdnsim_core::{AggregatedStatus, StatusWriter};
use tracing::warn;

pub struct DbStatusWriter {
    client: reqwest::blocking::Client,
    url: String,
}

impl DbStatusWriter {
    pub fn new(addr: &str, db_name: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(3))
            .pool_max_idle_per_host(0)
            .build()
            .expect("building reqwest client");
        Self {
            client,
            url: format!("{}/write?db={}", addr.trim_end_matches('/'), db_name),
        }
    }

    fn line_protocol(status: &AggregatedStatus) -> String {
        let nanos = status.time.and_utc().timestamp_nanos_opt().unwrap_or(0);
        let mut out = String::new();
        for v in &status.vods {
            out.push_str(&format!(
                "cache,vod={} hit={},miss={},originbps={},disk={},disklimit={} {}\n",
                v.vodid, v.hit, v.miss, status.origin_bps, v.disk, v.disk_limit, nanos
            ));
            out.push_str(&format!(
                "vod,vod={} bps={},bpslimit={},session={},sessionlimit={} {}\n",
                v.vodid, v.cur_bps, v.limit_bps, v.cur_session, v.limit_session, nanos
            ));
        }
        out
    }
}

impl StatusWriter for DbStatusWriter {
    fn write(&mut self, status: &AggregatedStatus) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let body = Self::line_protocol(status);
        let resp = self.client.post(&self.url).body(body).send()?;
        if resp.status().as_u16() != 204 {
            warn!(status = %resp.status(), url = %self.url, "metric emission got unexpected status");
        }
        Ok(())
    }
}
