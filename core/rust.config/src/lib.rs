use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub type Error = Box<dyn std::error::Error + Send + Sync>; // This is constant and should be copy pasted

/// Process-wide configuration, loaded once at startup
///
/// The file path defaults to `config.yaml` and can be overridden with the
/// `WARDEN_CONFIG_FILE` environment variable. A missing file yields the
/// defaults so library tests and fresh checkouts work without one.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| match Config::load() {
    Ok(config) => config,
    Err(e) => {
        log::warn!("Could not load config file, using defaults: {}", e);
        Config::default()
    }
});

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub meta: Meta,

    #[serde(default)]
    pub data: Data,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub moderation: Moderation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    #[serde(default)]
    pub support_server_invite: String,
}

impl Default for Meta {
    fn default() -> Self {
        Meta {
            bot_name: default_bot_name(),
            support_server_invite: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Data {
    /// Directory holding one JSON document per guild
    #[serde(default = "default_guilds_dir")]
    pub guilds_dir: String,
}

impl Default for Data {
    fn default() -> Self {
        Data {
            guilds_dir: default_guilds_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the scheduler scans for due tasks, in seconds
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moderation {
    /// Audit reason template used when a temporary punishment expires.
    /// `{reason}` is replaced with the reason given at ban time.
    #[serde(default = "default_unban_reason_template")]
    pub unban_reason_template: String,
}

impl Default for Moderation {
    fn default() -> Self {
        Moderation {
            unban_reason_template: default_unban_reason_template(),
        }
    }
}

fn default_bot_name() -> String {
    "Warden".to_string()
}

fn default_guilds_dir() -> String {
    "data/guilds".to_string()
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_unban_reason_template() -> String {
    "Temporary ban expired (was: {reason})".to_string()
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        let path = std::env::var("WARDEN_CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_string());
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;

        Ok(serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse {}: {}", path, e))?)
    }
}
