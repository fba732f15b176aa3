use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub github: GitHubConfig,
  pub fetch: FetchConfig,
  pub cache: CacheConfig,
  /// Directory the JSON reports are written to
  pub output_dir: PathBuf,
  /// Optional log file, in addition to stderr
  pub log_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      github: GitHubConfig::default(),
      fetch: FetchConfig::default(),
      cache: CacheConfig::default(),
      output_dir: PathBuf::from("output"),
      log_file: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
  pub api_host: String,
  pub owner: String,
  pub repo: String,
}

impl Default for GitHubConfig {
  fn default() -> Self {
    Self {
      api_host: "https://api.github.com".to_string(),
      owner: "opensearch-project".to_string(),
      repo: "OpenSearch".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  /// Hard limit on the number of pages requested per paginated resource.
  ///
  /// Results cut short by this limit are cached like complete ones, keyed by
  /// the PR watermark only. Raising the limit does not refetch PRs that have
  /// not changed since; clear the cache (`--clear-cache`) to pick up the
  /// extra pages.
  pub page_limit: u32,
  /// Pause before every request to a CI server, in seconds
  pub ci_request_delay_secs: f64,
  pub request_timeout_secs: u64,
  /// Only collect this pull request
  pub pr_number: Option<u64>,
  /// Only collect pull requests created on or after this date
  pub since: Option<NaiveDate>,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      page_limit: 5,
      ci_request_delay_secs: 1.0,
      request_timeout_secs: 30,
      pr_number: None,
      since: None,
    }
  }
}

impl FetchConfig {
  /// Out-of-range values fall back to no delay; `Config::validate` rejects them.
  pub fn ci_request_delay(&self) -> Duration {
    Duration::try_from_secs_f64(self.ci_request_delay_secs.max(0.0)).unwrap_or_default()
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Cache root (default: $XDG_CACHE_HOME/prtempo/requests)
  pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./prtempo.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/prtempo/config.yaml
  ///
  /// Built-in defaults apply when no file is found.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("prtempo.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("prtempo").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  /// Reject values the fetch layer cannot work with.
  pub fn validate(&self) -> Result<()> {
    url::Url::parse(&self.github.api_host)
      .map_err(|e| eyre!("Invalid api_host '{}': {}", self.github.api_host, e))?;
    if self.github.owner.is_empty() || self.github.repo.is_empty() {
      return Err(eyre!("github.owner and github.repo must be set"));
    }
    let delay = self.fetch.ci_request_delay_secs;
    if !delay.is_finite() || Duration::try_from_secs_f64(delay.max(0.0)).is_err() {
      return Err(eyre!("fetch.ci_request_delay_secs out of range: {}", delay));
    }
    Ok(())
  }

  /// Get the GitHub API token from environment variables.
  ///
  /// Checks PRTEMPO_GITHUB_TOKEN first, then GITHUB_TOKEN as fallback.
  /// Anonymous access works, at a much lower rate limit.
  pub fn get_api_token() -> Option<String> {
    std::env::var("PRTEMPO_GITHUB_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.github.api_host, "https://api.github.com");
    assert_eq!(config.fetch.page_limit, 5);
    assert_eq!(config.fetch.ci_request_delay(), Duration::from_secs(1));
    assert!(config.cache.enabled);
    assert!(config.fetch.since.is_none());
  }

  #[test]
  fn test_parse_overrides() {
    let config = Config::parse(
      r#"
github:
  owner: rust-lang
  repo: rust
fetch:
  page_limit: 2
  ci_request_delay_secs: 0.5
  since: 2024-03-01
cache:
  enabled: false
"#,
    )
    .unwrap();

    assert_eq!(config.github.owner, "rust-lang");
    assert_eq!(config.github.api_host, "https://api.github.com");
    assert_eq!(config.fetch.page_limit, 2);
    assert_eq!(config.fetch.ci_request_delay(), Duration::from_millis(500));
    assert_eq!(
      config.fetch.since,
      Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
    assert!(!config.cache.enabled);
  }

  #[test]
  fn test_invalid_host_rejected() {
    assert!(Config::parse("github:\n  api_host: not a url\n").is_err());
  }

  #[test]
  fn test_oversized_delay_rejected() {
    assert!(Config::parse("fetch:\n  ci_request_delay_secs: 1.0e300\n").is_err());

    let fetch = FetchConfig {
      ci_request_delay_secs: 1.0e300,
      ..FetchConfig::default()
    };
    assert_eq!(fetch.ci_request_delay(), Duration::ZERO);
  }

  #[test]
  fn test_missing_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(dir.path().join("missing.yaml").as_path())).is_err());
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prtempo.yaml");
    std::fs::write(&path, "fetch:\n  pr_number: 1234\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.fetch.pr_number, Some(1234));
  }
}
