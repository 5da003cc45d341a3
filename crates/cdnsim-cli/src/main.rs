//! CDN edge-tier discrete-event simulator CLI.
//!
//! Wires configuration loading, input ingestion, and the event engine in
//! `cdnsim-core` into a runnable binary.
//!
//! Grounded on `original_source/cdn-simul/main.go`'s flag set, with a
//! verbosity-driven `tracing-subscriber` setup and a single flat flag
//! surface rather than subcommands: the original is a one-shot batch
//! simulator, not an interactive daemon.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use cdnsim_core::{
    Config, Engine, EngineOptions, FileBaseConfig, HighLowConfig, LoadBalancer, RankerConfig,
    SelectorKind, StatusWriter,
};
use cdnsim_cli::{ingest, metrics, report, store};

/// Discrete-event simulator for a CDN edge tier: replays recorded viewer
/// sessions against a configurable VOD selection/caching policy.
#[derive(Parser)]
#[command(name = "cdnsim", version, about)]
struct Cli {
    /// Run configuration JSON (`hitResetTimes`, `vods[]`).
    #[arg(long)]
    cfg: PathBuf,

    /// Path to the persistent session-record store (sled tree).
    #[arg(long)]
    db: PathBuf,

    /// Maximum number of events to process before stopping.
    #[arg(long = "event-count")]
    event_count: Option<u64>,

    /// Status write period, in seconds. 0 logs after every event.
    #[arg(long = "log-period", default_value_t = 0)]
    log_period: i64,

    /// Remote metrics endpoint base URL, e.g. `http://localhost:8086`.
    #[arg(long = "db-addr")]
    db_addr: Option<String>,

    /// Remote metrics database name.
    #[arg(long = "db-name", default_value = "cdnsim")]
    db_name: String,

    /// Selector policy.
    #[arg(long = "lb", default_value = "hash")]
    lb: SelectorKind,

    /// `HighLowGroup` hot-list refresh period, in seconds.
    #[arg(long = "hot-period", default_value_t = 3600)]
    hot_period: i64,

    /// `HighLowGroup` hot-list rank cutoff.
    #[arg(long = "hot-rank", default_value_t = 50)]
    hot_rank: usize,

    /// Popularity-ranker sliding window, in seconds.
    #[arg(long = "stat-range", default_value_t = 86_400)]
    stat_range: i64,

    /// Delete-ranker sliding window, in seconds (defaults to `--stat-range`
    /// when unset).
    #[arg(long = "stat-range-del")]
    stat_range_del: Option<i64>,

    /// Popularity-ranker slot width, in seconds.
    #[arg(long = "shift-period", default_value_t = 3600)]
    shift_period: i64,

    /// File-base push-cycle period, in seconds.
    #[arg(long = "push-period", default_value_t = 300)]
    push_period: i64,

    /// File-base in-flight push-queue depth.
    #[arg(long = "push-delay", default_value_t = 2)]
    push_delay: usize,

    /// File-base dawn-hour push-period multiplier.
    #[arg(long = "dawn-push", default_value_t = 1)]
    dawn_push: usize,

    /// File catalogue CSV (`id,filename,bitrate,size,registerTime`).
    #[arg(long = "file-info")]
    file_info: Option<PathBuf>,

    /// Initial resident-content listing (file-base policy only).
    #[arg(long = "lb-history")]
    lb_history: Option<PathBuf>,

    /// Deliver-events CSV (`endTime,filename,filesize`).
    #[arg(long = "ads-csv")]
    ads_csv: Option<PathBuf>,

    /// Purge-events CSV (`date,time,filename`).
    #[arg(long = "purge-csv")]
    purge_csv: Option<PathBuf>,

    /// Weight ranker hits by session duration.
    #[arg(long = "session-duration")]
    session_duration: bool,

    /// Use the LRU delete ranker instead of the hit ranker's own deletable
    /// ordering (file-base policy only).
    #[arg(long = "delete-lru")]
    delete_lru: bool,

    /// Weight ranker hits by file size.
    #[arg(long = "file-size")]
    file_size: bool,

    /// Apply time-decay weighting across popularity-ranker slots.
    #[arg(long = "time-weight")]
    time_weight: bool,

    /// Bypass list: plain text, one filename per line.
    #[arg(long)]
    bypass: Option<PathBuf>,

    /// Enable the first-hit bypass filter.
    #[arg(long = "first-bypass")]
    first_bypass: bool,

    /// First-bypass filter period, in seconds.
    #[arg(long = "fb-period", default_value_t = 3600)]
    fb_period: i64,

    /// Run identifier, used only in log context.
    #[arg(long)]
    id: Option<String>,

    /// Replay start-time gate (`YYYY-MM-DD HH:MM:SS`). Records before this
    /// time are skipped entirely.
    #[arg(long)]
    start: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}

fn parse_start_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("invalid --start timestamp {s:?}, expected \"YYYY-MM-DD HH:MM:SS\""))
}

fn run(cli: Cli) -> Result<()> {
    let cfg_text = std::fs::read_to_string(&cli.cfg).with_context(|| format!("reading config {:?}", cli.cfg))?;
    let config: Config = serde_json::from_str(&cfg_text).with_context(|| format!("parsing config {:?}", cli.cfg))?;
    config.validate().context("invalid run configuration")?;

    let ranker_cfg = RankerConfig {
        stat_window_secs: cli.stat_range,
        shift_period_secs: cli.shift_period,
        use_session_duration: cli.session_duration,
        use_file_size: cli.file_size,
        use_time_weight: cli.time_weight,
    };
    let fb_cfg = FileBaseConfig {
        push_period_secs: cli.push_period,
        push_delay_n: cli.push_delay,
        dawn_push_n: cli.dawn_push,
        stat_window_for_del_secs: cli.stat_range_del,
        use_delete_lru: cli.delete_lru,
    };
    let hl_cfg = HighLowConfig {
        update_hot_period_secs: cli.hot_period,
        hot_rank_limit: cli.hot_rank,
        ..HighLowConfig::default()
    };

    let mut catalogue = match &cli.file_info {
        Some(p) => ingest::load_catalogue(p)?,
        None => cdnsim_core::FileCatalogue::new(),
    };

    let deliver = match &cli.ads_csv {
        Some(p) => ingest::load_deliver(p)?,
        None => vec![],
    };
    let purge = match &cli.purge_csv {
        Some(p) => ingest::load_purge(p)?,
        None => vec![],
    };
    let bypass_list: HashSet<String> = match &cli.bypass {
        Some(p) => ingest::load_bypass_list(p)?,
        None => HashSet::new(),
    };

    let lb_kind: SelectorKind = cli.lb;
    let mut balancer = LoadBalancer::new(lb_kind, &config, ranker_cfg, fb_cfg, hl_cfg, deliver, purge)
        .context("constructing load balancer")?;

    let start_time = cli.start.as_deref().map(parse_start_time).transpose()?;
    if matches!(lb_kind, SelectorKind::FileBase) {
        if let Some(p) = &cli.lb_history {
            let names = ingest::load_resident_list(p)?;
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let seed_time = start_time.unwrap_or_else(|| config.hit_reset_times.first().copied().unwrap_or(epoch));
            balancer.seed_filebase_resident(&names, &mut catalogue, seed_time);
        }
    }

    let writer: Box<dyn StatusWriter> = match &cli.db_addr {
        Some(addr) => Box::new(metrics::DbStatusWriter::new(addr, &cli.db_name)),
        None => Box::new(report::StdStatusWriter::new(std::io::stdout())),
    };

    let records = store::SledRecordIter::open(&cli.db).context("opening session record store")?;

    let opts = EngineOptions {
        max_events: cli.event_count,
        start_time,
        status_write_period_secs: cli.log_period,
        bypass_list,
        first_bypass_enabled: cli.first_bypass,
        first_bypass_period_secs: cli.fb_period,
        hit_reset_times: config.hit_reset_times.clone(),
    };

    let run_id = cli.id.as_deref().unwrap_or("-");
    info!(run_id, lb = ?lb_kind, "starting simulation run");

    let mut engine = Engine::new(records, catalogue, balancer, Some(writer), opts);
    engine.run().context("simulation run failed")?;

    info!(run_id, "simulation run finished");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "fatal error, aborting");
        std::process::exit(1);
    }
    Ok(())
}
