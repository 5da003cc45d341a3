//! Run configuration: the JSON document of §6 plus the ranker/selector
//! windows surfaced as CLI flags by `cdnsim-cli`.
//!
//! Plain serde structs with `Default` impls, validated explicitly rather
//! than at deserialize time.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::VodKey;

/// A single VOD's static resource caps, as loaded from the config JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VodConfig {
    pub vodid: String,
    #[serde(rename = "storageSize")]
    pub storage_size: i64,
    #[serde(rename = "limitSession")]
    pub limit_session: i64,
    #[serde(rename = "limitBps")]
    pub limit_bps: i64,
}

impl VodConfig {
    pub fn key(&self) -> VodKey {
        VodKey(self.vodid.clone())
    }
}

/// Top-level run configuration (`{ hitResetTimes, vods }`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "hitResetTimes", default)]
    pub hit_reset_times: Vec<chrono::NaiveDateTime>,
    #[serde(default)]
    pub vods: Vec<VodConfig>,
}

impl Config {
    /// Structural validation: non-empty VOD list, positive caps, distinct
    /// ids. Called once at startup; failures are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vods.is_empty() {
            return Err(ConfigError::Invalid("config has no vods".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for v in &self.vods {
            if v.storage_size <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "vod {} has non-positive storageSize",
                    v.vodid
                )));
            }
            if v.limit_session <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "vod {} has non-positive limitSession",
                    v.vodid
                )));
            }
            if v.limit_bps <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "vod {} has non-positive limitBps",
                    v.vodid
                )));
            }
            if !seen.insert(v.vodid.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate vod id {}",
                    v.vodid
                )));
            }
        }
        Ok(())
    }

    pub fn find(&self, key: &VodKey) -> Option<&VodConfig> {
        self.vods.iter().find(|v| v.vodid == key.0)
    }
}

/// Selector policy, chosen via `--lb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    #[serde(rename = "hash")]
    SameHashingWeight,
    #[serde(rename = "weight-storage")]
    WeightStorage,
    #[serde(rename = "weight-storage-bps")]
    WeightStorageBps,
    #[serde(rename = "dup2")]
    SameWeightDup2,
    #[serde(rename = "high-low")]
    HighLowGroup,
    #[serde(rename = "legacy")]
    Legacy,
    #[serde(rename = "filebase")]
    FileBase,
}

impl std::str::FromStr for SelectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "hash" => Self::SameHashingWeight,
            "weight-storage" => Self::WeightStorage,
            "weight-storage-bps" => Self::WeightStorageBps,
            "dup2" => Self::SameWeightDup2,
            "high-low" => Self::HighLowGroup,
            "legacy" => Self::Legacy,
            "filebase" => Self::FileBase,
            other => return Err(ConfigError::UnknownSelector(other.to_string())),
        })
    }
}

/// Popularity-ranker tuning, surfaced via `--stat-range`, `--shift-period`,
/// `--session-duration`, `--file-size`, `--time-weight`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankerConfig {
    pub stat_window_secs: i64,
    pub shift_period_secs: i64,
    pub use_session_duration: bool,
    pub use_file_size: bool,
    pub use_time_weight: bool,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            stat_window_secs: 24 * 3600,
            shift_period_secs: 3600,
            use_session_duration: false,
            use_file_size: false,
            use_time_weight: false,
        }
    }
}

/// File-base placement tuning, surfaced via `--push-period`, `--push-delay`,
/// `--dawn-push`, `--stat-range-del`, `--delete-lru`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileBaseConfig {
    pub push_period_secs: i64,
    pub push_delay_n: usize,
    pub dawn_push_n: usize,
    pub stat_window_for_del_secs: Option<i64>,
    pub use_delete_lru: bool,
}

impl Default for FileBaseConfig {
    fn default() -> Self {
        Self {
            push_period_secs: 300,
            push_delay_n: 2,
            dawn_push_n: 1,
            stat_window_for_del_secs: None,
            use_delete_lru: false,
        }
    }
}

/// High/low group tuning, surfaced via `--hot-period`, `--hot-rank`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HighLowConfig {
    pub update_hot_period_secs: i64,
    pub hot_rank_limit: usize,
    pub high_bps_threshold: i64,
}

impl Default for HighLowConfig {
    fn default() -> Self {
        Self {
            update_hot_period_secs: 3600,
            hot_rank_limit: 50,
            high_bps_threshold: 5_000_000_000,
        }
    }
}
