use crate::error::CreditsResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "creditroll.toml";
pub const ENV_PREFIX: &str = "CREDITROLL";

/// GitHub caps `per_page` at 100 for every listing we use.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub forge: ForgeConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub page_size: u32,
    pub max_concurrent_repositories: usize,
    pub max_concurrent_lookups: usize,
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String,
    pub path: Option<PathBuf>,
    pub color: bool,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.github.com".to_string(),
            user_agent: concat!("creditroll/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            token_file: PathBuf::from(".token"),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_concurrent_repositories: 4,
            max_concurrent_lookups: 8,
            deadline_secs: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            path: None,
            color: true,
        }
    }
}

impl ForgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CrawlConfig {
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Layers an optional TOML file under `CREDITROLL_*` environment
    /// variables (`CREDITROLL_CRAWL__PAGE_SIZE=50`). A missing default file
    /// is fine, an explicitly requested one is not.
    pub fn load(path: Option<&Path>) -> CreditsResult<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()?;

        Ok(config)
    }
}
