use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::achievements::MonthDay;
use crate::quota::DEFAULT_DAILY_LIMIT;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Generations allowed per local calendar day
  pub daily_limit: u32,
  /// User's birthday as "MM-DD", enables the birthday achievement
  #[serde(deserialize_with = "deserialize_birthday")]
  pub birthday: Option<MonthDay>,
  /// Where the database and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  pub cache: CacheConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      daily_limit: DEFAULT_DAILY_LIMIT,
      birthday: None,
      data_dir: None,
      cache: CacheConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Set to false to disable caching entirely
  pub enabled: bool,
  /// Bumping this invalidates every older namespace on activation
  pub version: String,
  pub prefix: String,
  /// Site that paths passed to `fetch` are resolved against
  pub origin: String,
  /// Assets pre-populated into the static cache on install
  pub static_assets: Vec<String>,
  /// How often outdated namespaces are swept while a controller runs
  pub sweep_interval_hours: u64,
  pub request_timeout_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      version: "v2.0".to_string(),
      prefix: "3dflick".to_string(),
      origin: "http://localhost:8080/".to_string(),
      static_assets: ["/", "/index.html", "/new-style.css", "/manifest.json"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      sweep_interval_hours: 24,
      request_timeout_secs: 30,
    }
  }
}

/// Upper bound for `sweep_interval_hours` (one year)
const MAX_SWEEP_INTERVAL_HOURS: u64 = 24 * 365;

impl CacheConfig {
  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_hours.saturating_mul(3600))
  }
}

fn deserialize_birthday<'de, D>(deserializer: D) -> Result<Option<MonthDay>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  raw
    .map(|s| s.parse().map_err(serde::de::Error::custom))
    .transpose()
}

impl Config {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./flick.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/flick/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("flick.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("flick").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn validate(&self) -> Result<()> {
    if self.daily_limit == 0 {
      return Err(eyre!("daily_limit must be at least 1"));
    }
    if !(1..=MAX_SWEEP_INTERVAL_HOURS).contains(&self.cache.sweep_interval_hours) {
      return Err(eyre!(
        "cache.sweep_interval_hours must be between 1 and {}",
        MAX_SWEEP_INTERVAL_HOURS
      ));
    }
    url::Url::parse(&self.cache.origin)
      .map_err(|e| eyre!("Invalid cache.origin '{}': {}", self.cache.origin, e))?;
    Ok(())
  }

  /// Data directory: configured, or the platform default.
  pub fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => crate::db::Database::default_dir(),
    }
  }
}
