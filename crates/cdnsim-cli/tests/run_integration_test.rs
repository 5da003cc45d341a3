// Integration test covering ingestion, the sled-backed session store, and
// the core engine wired together the way `main.rs` wires them.

use std::io::Write;

use chrono::NaiveDate;

use cdnsim_cli::store;
use cdnsim_core::config::{Config, FileBaseConfig, HighLowConfig, RankerConfig, SelectorKind, VodConfig};
use cdnsim_core::{Engine, EngineOptions, LoadBalancer, SessionRecord};

fn t(h: u32, m: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
}

fn rec(sid: &str, filename: &str, start: chrono::NaiveDateTime, end: chrono::NaiveDateTime) -> SessionRecord {
    SessionRecord {
        sid: sid.into(),
        started: start,
        ended: end,
        filename: filename.into(),
        bandwidth: 4_000_000,
        offset: 0,
        filesize: Some(10_000_000),
        is_center: false,
    }
}

#[test]
fn end_to_end_run_against_sled_store_and_csv_catalogue() {
    let dir = tempfile::tempdir().unwrap();

    let catalogue_path = dir.path().join("catalogue.csv");
    let mut f = std::fs::File::create(&catalogue_path).unwrap();
    writeln!(f, "id,filename,bitrate,size,registerTime").unwrap();
    writeln!(f, "1,a.mpg,4000000,10000000,2020-01-01T00:00:00").unwrap();
    let catalogue = cdnsim_cli::ingest::load_catalogue(&catalogue_path).unwrap();
    assert!(catalogue.exists("a.mpg"));

    let store_path = dir.path().join("sessions.sled");
    let records = vec![
        rec("s1", "a.mpg", t(0, 0), t(0, 1)),
        rec("s2", "a.mpg", t(0, 2), t(0, 3)),
    ];
    store::seed_sled_store(&store_path, &records).unwrap();
    let iter = store::SledRecordIter::open(&store_path).unwrap();

    let cfg = Config {
        hit_reset_times: vec![],
        vods: vec![VodConfig {
            vodid: "v1".into(),
            storage_size: 100_000_000,
            limit_session: 10,
            limit_bps: 1_000_000_000,
        }],
    };
    let balancer = LoadBalancer::new(
        SelectorKind::SameHashingWeight,
        &cfg,
        RankerConfig::default(),
        FileBaseConfig::default(),
        HighLowConfig::default(),
        vec![],
        vec![],
    )
    .unwrap();

    let mut engine = Engine::new(
        iter,
        catalogue,
        balancer,
        None,
        EngineOptions {
            max_events: None,
            start_time: None,
            status_write_period_secs: 0,
            bypass_list: Default::default(),
            first_bypass_enabled: false,
            first_bypass_period_secs: 3600,
            hit_reset_times: vec![],
        },
    );

    engine.run().unwrap();
    assert!(engine.catalogue().exists("a.mpg"));
    let vod = engine.balancer().vods().get(&cdnsim_core::VodKey::from("v1")).unwrap();
    assert_eq!(vod.cur_session_count, 0);
    assert_eq!(vod.total_session_count, 2);
}
