use std::env;
use std::time::Duration;

use carepoint_booking::MutationRefresh;
use carepoint_schedule::SlotPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub polling: PollingConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_timeout() -> u64 { 30 }

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the durable session record
    pub session_dir: String,
}

/// Settings for the in-process identity provider used by local runs.
#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    pub mock_secret: String,
    pub token_ttl_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl PollingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub slot_window_days: u32,
    pub slot_interval_minutes: u32,
    pub max_displayed_slots: usize,
    #[serde(default = "default_reload")]
    pub reload_after_mutation: bool,
}

fn default_reload() -> bool { true }

impl BookingConfig {
    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            window_days: self.slot_window_days,
            interval_minutes: self.slot_interval_minutes,
            display_limit: self.max_displayed_slots,
        }
    }

    pub fn mutation_refresh(&self) -> MutationRefresh {
        if self.reload_after_mutation {
            MutationRefresh::ReloadView
        } else {
            MutationRefresh::AwaitNextTick
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load_from("config", &run_mode)
    }

    /// Layered load from `dir`: `default`, then `{run_mode}` and `local` if
    /// present, then `CAREPOINT`-prefixed environment variables (`__` between
    /// section and key).
    pub fn load_from(dir: &str, run_mode: &str) -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            .add_source(config::Environment::with_prefix("CAREPOINT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
