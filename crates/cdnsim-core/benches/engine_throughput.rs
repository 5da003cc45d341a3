//! Throughput benchmarks for the simulation core.
//!
//! Benchmarks for measuring:
//! - hash-ring lookup cost under varying VOD counts
//! - LRU cache admit/evict cost
//! - end-to-end engine throughput over a synthetic session stream
//!
//! Run with: cargo bench --bench engine_throughput -p cdnsim-core

use std::collections::HashSet;

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cdnsim_core::balancer::LoadBalancer;
use cdnsim_core::cache::Cache;
use cdnsim_core::catalogue::FileCatalogue;
use cdnsim_core::config::{Config, FileBaseConfig, HighLowConfig, RankerConfig, SelectorKind, VodConfig};
use cdnsim_core::engine::{Engine, EngineOptions};
use cdnsim_core::hashring::HashRing;
use cdnsim_core::types::{ChunkEvent, SessionRecord, VodKey};

fn t(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(h, m, s).unwrap()
}

fn bench_hashring_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashring_lookup");

    for vod_count in [4usize, 16, 64] {
        let mut ring = HashRing::new(3000);
        for i in 0..vod_count {
            ring.add(VodKey::from(format!("vod-{i}").as_str()), 1);
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("vods", vod_count), &ring, |b, ring| {
            b.iter(|| black_box(ring.get_items(black_box("file-12345.mpg"))))
        });
    }

    group.finish();
}

fn bench_cache_admit_evict(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_admit_evict");

    group.bench_function("miss_then_hit_2mb_chunks", |b| {
        b.iter(|| {
            let mut cache = Cache::new(200_000_000);
            for i in 0..100 {
                let evt = ChunkEvent {
                    time: t(0, 0, 0),
                    sid: "s1".into(),
                    filename: "a.mpg".into(),
                    file_id: 1,
                    bps: 4_000_000,
                    index: i,
                    chunk_size: 2_000_000,
                    bypass: false,
                    is_center: false,
                };
                black_box(cache.start_chunk(&evt).unwrap());
            }
        })
    });

    group.finish();
}

fn synthetic_records(n: usize) -> Vec<SessionRecord> {
    (0..n)
        .map(|i| {
            let start = t(0, 0, 0) + chrono::Duration::milliseconds((i * 50) as i64);
            SessionRecord {
                sid: format!("s{i}"),
                started: start,
                ended: start + chrono::Duration::seconds(5),
                filename: format!("file-{}.mpg", i % 200),
                bandwidth: 4_000_000,
                offset: 0,
                filesize: Some(20_000_000),
                is_center: false,
            }
        })
        .collect()
}

fn bench_engine_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_run");

    for session_count in [100usize, 1000] {
        group.throughput(Throughput::Elements(session_count as u64));
        group.bench_with_input(BenchmarkId::new("sessions", session_count), &session_count, |b, &n| {
            b.iter(|| {
                let cfg = Config {
                    hit_reset_times: vec![],
                    vods: vec![VodConfig {
                        vodid: "v1".into(),
                        storage_size: 500_000_000,
                        limit_session: 10_000,
                        limit_bps: 10_000_000_000,
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
                    synthetic_records(n).into_iter(),
                    FileCatalogue::new(),
                    balancer,
                    None,
                    EngineOptions {
                        max_events: None,
                        start_time: None,
                        status_write_period_secs: 0,
                        bypass_list: HashSet::new(),
                        first_bypass_enabled: false,
                        first_bypass_period_secs: 3600,
                        hit_reset_times: vec![],
                    },
                );
                black_box(engine.run().unwrap());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hashring_lookup, bench_cache_admit_evict, bench_engine_run);
criterion_main!(benches);
