use rollcall_core::{LocationWhitelist, Pagination};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub booking: BookingRules,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// Upper bound on waiting for an event's serialization point.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

impl BookingRules {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self { lock_wait_ms: default_lock_wait_ms() }
    }
}

fn default_lock_wait_ms() -> u64 { 2000 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// When unset the API runs against the in-memory store.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 { 10 }

fn default_acquire_timeout_secs() -> u64 { 3 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from(dir: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            // Add in settings from the environment (with a prefix of ROLLCALL)
            // Eg.. `ROLLCALL_DATABASE__URL=postgres://...` would set `database.url`
            .add_source(
                config::Environment::with_prefix("ROLLCALL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn location_whitelist(&self) -> LocationWhitelist {
        LocationWhitelist::new(&self.locations)
    }
}
