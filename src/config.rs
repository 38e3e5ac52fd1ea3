use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fetch strategy for read requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Serve from cache when present, otherwise network (the default).
  #[default]
  CacheFirst,
  /// Race the network against a timeout, fall back to cache.
  NetworkFirst,
  /// Serve cached data immediately, refresh the cache in the background.
  StaleWhileRevalidate,
}

impl Strategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      Strategy::CacheFirst => "cache-first",
      Strategy::NetworkFirst => "network-first",
      Strategy::StaleWhileRevalidate => "stale-while-revalidate",
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Strategy {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "cache-first" => Ok(Strategy::CacheFirst),
      "network-first" => Ok(Strategy::NetworkFirst),
      "stale-while-revalidate" => Ok(Strategy::StaleWhileRevalidate),
      other => Err(eyre!("Unknown strategy: {}", other)),
    }
  }
}

/// Active caching policy. Mutated only via the strategy-update message;
/// the last-chosen strategy is persisted to settings storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
  pub strategy: Strategy,
  /// Network-first gives the network this long before falling back to cache.
  pub network_timeout_ms: u64,
  /// Runtime bucket entry limit, enforced after every write.
  pub max_entries: usize,
  /// Declared but advisory: no age-based sweep runs against the buckets.
  pub max_age_seconds: u64,
}

impl Default for StrategyConfig {
  fn default() -> Self {
    Self {
      strategy: Strategy::CacheFirst,
      network_timeout_ms: 3000,
      max_entries: 64,
      max_age_seconds: 86400,
    }
  }
}

/// Remote document store endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  pub url: String,
  /// Document id holding the shared password hash.
  #[serde(default = "default_auth_document")]
  pub auth_document: String,
}

fn default_auth_document() -> String {
  "auth/password".to_string()
}

fn default_cache_version() -> u32 {
  1
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: StrategyConfig,

  /// Bumping the version supersedes old buckets on activation.
  pub cache_version: u32,

  /// Static assets fetched and cached verbatim at install.
  pub static_manifest: Vec<String>,

  pub remote: Option<RemoteConfig>,

  /// Drop a queued action after this many failed replays. None retries
  /// forever, matching the original behavior.
  pub max_replay_attempts: Option<u32>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache: StrategyConfig::default(),
      cache_version: default_cache_version(),
      static_manifest: Vec::new(),
      remote: None,
      max_replay_attempts: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./holdfast.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/holdfast/config.yaml
  ///
  /// No file found is not an error: defaults apply.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("holdfast.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("holdfast").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Versioned bucket holding the install-time static manifest.
  pub fn static_bucket(&self) -> String {
    format!("static-v{}", self.cache_version)
  }

  /// Versioned bucket holding runtime-cached responses.
  pub fn runtime_bucket(&self) -> String {
    format!("runtime-v{}", self.cache_version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_cache_first_with_3s_timeout() {
    let config = StrategyConfig::default();
    assert_eq!(config.strategy, Strategy::CacheFirst);
    assert_eq!(config.network_timeout_ms, 3000);
    assert_eq!(config.max_entries, 64);
  }

  #[test]
  fn strategy_round_trips_kebab_case() {
    for s in [
      Strategy::CacheFirst,
      Strategy::NetworkFirst,
      Strategy::StaleWhileRevalidate,
    ] {
      let parsed: Strategy = s.as_str().parse().unwrap();
      assert_eq!(parsed, s);
    }
    assert!("cache_first".parse::<Strategy>().is_err());
  }

  #[test]
  fn parses_yaml_config() {
    let yaml = r#"
cache:
  strategy: network-first
  network_timeout_ms: 1500
cache_version: 3
static_manifest:
  - "/"
  - "/index.html"
remote:
  url: "https://store.example.com/db"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.cache.strategy, Strategy::NetworkFirst);
    assert_eq!(config.cache.network_timeout_ms, 1500);
    assert_eq!(config.static_bucket(), "static-v3");
    assert_eq!(config.runtime_bucket(), "runtime-v3");
    assert_eq!(config.static_manifest.len(), 2);
    assert_eq!(config.remote.unwrap().auth_document, "auth/password");
  }

  #[test]
  fn bucket_names_follow_version() {
    let config = Config::default();
    assert_eq!(config.static_bucket(), "static-v1");
    assert_eq!(config.runtime_bucket(), "runtime-v1");
  }
}
