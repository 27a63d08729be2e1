use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable naming the TOML file to load.
pub const CONFIG_ENV: &str = "POTLUCK_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the sled database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Used when `RUST_LOG` is unset: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Received records younger than this are left alone by the orphan repair pass.
    #[serde(default = "default_orphan_repair_age_secs")]
    pub orphan_repair_age_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("potluck-data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_orphan_repair_age_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            orphan_repair_age_secs: default_orphan_repair_age_secs(),
        }
    }
}

impl Config {
    /// Loads the file named by `POTLUCK_CONFIG`, or the defaults when it is unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("parsing config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies the first positional argument as the port, if present.
    pub fn with_args(mut self, mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        if let Some(port) = args.nth(1) {
            self.port = port
                .parse()
                .with_context(|| format!("`{port}` is not a valid port"))?;
        }
        Ok(self)
    }

    pub fn orphan_repair_age(&self) -> Duration {
        Duration::from_secs(self.orphan_repair_age_secs)
    }
}
