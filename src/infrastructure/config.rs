//! Configuration loading, grounded on the teacher's
//! `infrastructure::config::loader::ConfigLoader` — defaults merged with
//! environment, then validated as a separate pass. Env var names are
//! unprefixed (`MAX_WORKERS`, not `CODESWARM_MAX_WORKERS`) to match the
//! original implementation's `config.py` exactly.

use crate::domain::ports::errors::ConfigError;
use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub max_workers: usize,
    pub max_tasks: usize,
    pub reconciler_interval: u64,
    pub worker_timeout: u64,
    pub max_retries: u32,
    pub api_rate_limit_rpm: u32,
    pub workspace_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub db_path: PathBuf,
    pub outputs_dir: PathBuf,
    pub llm_base_url: String,
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: String,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 15,
            max_tasks: 100,
            reconciler_interval: 120,
            worker_timeout: 300,
            max_retries: 3,
            api_rate_limit_rpm: 20,
            workspace_dir: PathBuf::from("./workspace"),
            logs_dir: PathBuf::from("./logs"),
            db_path: PathBuf::from("./db/tasks.db"),
            outputs_dir: PathBuf::from("./outputs"),
            llm_base_url: "https://api.minimax.io/v1".to_string(),
            llm_model: "MiniMax-M2.5".to_string(),
            llm_api_key: String::new(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Merge programmatic defaults with environment variables (unprefixed,
    /// matching the original's `os.environ.get` lookups) and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::raw())
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_workers",
                value: self.max_workers.to_string(),
                reason: "must be at least 1",
            });
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::Invalid {
                field: "max_tasks",
                value: self.max_tasks.to_string(),
                reason: "must be at least 1",
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                value: self.max_retries.to_string(),
                reason: "must be at least 1, or tasks could never leave running on failure",
            });
        }
        if self.api_rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid {
                field: "api_rate_limit_rpm",
                value: self.api_rate_limit_rpm.to_string(),
                reason: "must be at least 1",
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                value: self.log_level.clone(),
                reason: "must be one of trace, debug, info, warn, error",
            });
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ConfigError::Invalid {
                field: "log_format",
                value: self.log_format.clone(),
                reason: "must be one of json, pretty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_max_workers_is_rejected() {
        let mut config = Config::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unrecognized_log_level_is_rejected() {
        let mut config = Config::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
