use eyre::{Context, Result};
use msgloop::options::RawOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub buses: BusesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `signals.db` and `queue.db`
    pub dir: PathBuf,
    pub redeliver_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("msgloop"),
            redeliver_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queues to consume when none are given on the command line
    pub receivers: Vec<String>,
    /// Default option map, overridden key by key by CLI flags
    pub options: RawOptions,
    /// Per-receiver throttles
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            receivers: vec!["async".to_string()],
            options: RawOptions::new(),
            rate_limits: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub permits: u32,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusesConfig {
    /// Named buses available to `--bus`
    pub names: Vec<String>,
    /// Bus used for message types without a route
    pub default: String,
    /// Message type -> bus name
    pub routes: HashMap<String, String>,
}

impl Default for BusesConfig {
    fn default() -> Self {
        Self {
            names: vec!["default".to_string()],
            default: "default".to_string(),
            routes: HashMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            store: StoreConfig::default(),
            worker: WorkerConfig::default(),
            buses: BusesConfig::default(),
        }
    }
}

impl Config {
    /// Default log filter, used when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgloop::options::resolve;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker.receivers, vec!["async".to_string()]);
        assert_eq!(config.buses.default, "default");
        assert_eq!(config.store.redeliver_timeout_secs, 3600);
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(Config::default().log_filter(), "info");

        let config: Config = serde_yaml::from_str("log_level: debug\n").unwrap();
        assert_eq!(config.log_filter(), "debug");

        let config: Config = serde_yaml::from_str("log_level: ~\n").unwrap();
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
log_level: debug
store:
  dir: /var/lib/msgloop
worker:
  receivers: [high, low]
  options:
    limit: 100
    memory-limit: 256M
    sleep: 0.5
  rate_limits:
    low:
      permits: 10
      interval_ms: 1000
buses:
  names: [command.bus, event.bus]
  default: command.bus
  routes:
    UserRegistered: event.bus
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store.dir, PathBuf::from("/var/lib/msgloop"));
        assert_eq!(config.store.redeliver_timeout_secs, 3600);
        assert_eq!(config.worker.receivers.len(), 2);
        assert_eq!(config.worker.rate_limits["low"].permits, 10);
        assert_eq!(config.buses.routes["UserRegistered"], "event.bus");

        let options = resolve(&config.worker.options).unwrap();
        assert_eq!(options.limit, Some(100));
        assert_eq!(options.sleep, Duration::from_millis(500));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("msgloop.yml");
        fs::write(&path, "worker:\n  receivers: [emails]\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.worker.receivers, vec!["emails".to_string()]);
        assert_eq!(config.buses.names, vec!["default".to_string()]);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/msgloop.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
