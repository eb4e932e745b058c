//! Configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::download::DownloadConfig;
use crate::driver::DriverConfig;
use crate::env::substitute_env_vars;
use crate::error::HubError;
use crate::model::{Account, ExtractFolder, Meta, OrderBy, OrderDirection, Proxy, Sort};
use crate::path;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Listing cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Root of the download staging directories
    pub temp_dir: Option<PathBuf>,

    /// External downloader; downloads are disabled without it
    pub downloader: Option<DownloadConfig>,

    /// Values used by every account that does not set its own
    #[serde(default)]
    pub defaults: AccountDefaults,

    /// Mounted accounts
    pub accounts: Vec<RawAccountConfig>,

    /// Visibility policies
    #[serde(default)]
    pub metas: Vec<Meta>,
}

/// Top-level account defaults section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccountDefaults {
    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
    pub extract_folder: Option<ExtractFolder>,
    pub no_cache: Option<bool>,
    pub no_upload: Option<bool>,
    pub local_sort: Option<bool>,
}

/// Raw account configuration before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountConfig {
    /// Where the account appears in the virtual namespace
    pub virtual_path: String,

    /// Ordering among sibling mounts
    #[serde(default)]
    pub index: i32,

    /// Backend configuration
    pub driver: DriverSpec,

    #[serde(default)]
    pub remark: String,

    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
    pub extract_folder: Option<ExtractFolder>,

    pub web_proxy: Option<bool>,
    pub webdav_policy: Option<String>,
    pub down_proxy_url: Option<String>,

    pub no_cache: Option<bool>,
    pub no_upload: Option<bool>,
    pub local_sort: Option<bool>,
}

/// Driver configuration (tagged enum)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverSpec {
    /// A directory on the host filesystem
    Local(LocalDriverConfig),

    /// An in-process tree
    Memory(MemoryDriverConfig),
}

impl DriverSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverSpec::Local(_) => "local",
            DriverSpec::Memory(_) => "memory",
        }
    }
}

/// Local driver configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LocalDriverConfig {
    /// Absolute host path served as the account root
    pub root_folder_path: PathBuf,
}

/// Memory driver configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MemoryDriverConfig {
    /// Id advertised for the root folder
    #[serde(default = "default_root_folder_id")]
    pub root_folder_id: String,

    /// Validity of produced links; links are not cached without it
    #[serde(default, with = "humantime_serde")]
    pub link_ttl: Option<Duration>,
}

fn default_root_folder_id() -> String {
    "root".to_string()
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self {
            root_folder_id: default_root_folder_id(),
            link_ttl: None,
        }
    }
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Listing cache configuration
    pub cache: CacheConfig,

    /// Root of the download staging directories
    pub temp_dir: PathBuf,

    /// External downloader, if configured
    pub downloader: Option<DownloadConfig>,

    /// Accounts (fully resolved)
    pub accounts: Vec<AccountConfig>,

    /// Visibility policies
    pub metas: Vec<Meta>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Account configuration (resolved)
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub account: Account,
    pub driver: DriverSpec,
    pub config: DriverConfig,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging account overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            cache,
            temp_dir,
            downloader,
            defaults,
            accounts,
            metas,
        } = self;

        let resolved_accounts = accounts
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Self::resolve_account(&defaults, i as u32 + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            logging,
            cache,
            temp_dir: temp_dir.unwrap_or_else(|| std::env::temp_dir().join("mounthub")),
            downloader,
            accounts: resolved_accounts,
            metas,
        })
    }

    fn resolve_account(
        defaults: &AccountDefaults,
        id: u32,
        raw: RawAccountConfig,
    ) -> Result<AccountConfig, ConfigError> {
        if raw.virtual_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Account {} has an empty virtual_path",
                id
            )));
        }

        let addition = serde_json::to_string(&raw.driver).map_err(|e| {
            ConfigError::ValidationError(format!(
                "Account {}: cannot encode driver config: {}",
                raw.virtual_path, e
            ))
        })?;

        // Account values override defaults
        let account = Account {
            id,
            virtual_path: path::standardize(&raw.virtual_path),
            index: raw.index,
            driver: raw.driver.kind().to_string(),
            status: "work".to_string(),
            addition,
            remark: raw.remark,
            modified: Utc::now(),
            sort: Sort {
                order_by: raw.order_by.or(defaults.order_by),
                order_direction: raw
                    .order_direction
                    .or(defaults.order_direction)
                    .unwrap_or_default(),
                extract_folder: raw
                    .extract_folder
                    .or(defaults.extract_folder)
                    .unwrap_or_default(),
            },
            proxy: Proxy {
                web_proxy: raw.web_proxy.unwrap_or(false),
                webdav_policy: raw.webdav_policy.unwrap_or_default(),
                down_proxy_url: raw.down_proxy_url.unwrap_or_default(),
            },
        };

        let config = DriverConfig {
            name: raw.driver.kind().to_string(),
            local_sort: raw.local_sort.or(defaults.local_sort).unwrap_or(false),
            no_cache: raw.no_cache.or(defaults.no_cache).unwrap_or(false),
            no_upload: raw.no_upload.or(defaults.no_upload).unwrap_or(false),
        };

        Ok(AccountConfig {
            account,
            driver: raw.driver,
            config,
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting environment
    /// variables first
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one account is required".to_string(),
            ));
        }

        // Check for duplicate virtual paths
        let mut paths = std::collections::HashSet::new();
        for account in &self.accounts {
            if !paths.insert(account.account.virtual_path.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate virtual path: {}",
                    account.account.virtual_path
                )));
            }
        }

        // Validate driver configs
        for account in &self.accounts {
            if let DriverSpec::Local(local) = &account.driver {
                if !local.root_folder_path.is_absolute() {
                    return Err(ConfigError::ValidationError(format!(
                        "Account {}: root_folder_path must be absolute",
                        account.account.virtual_path
                    )));
                }
            }
        }

        if let Some(downloader) = &self.downloader {
            if downloader.max_concurrent == 0 {
                return Err(ConfigError::ValidationError(
                    "downloader.max_concurrent must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for HubError {
    fn from(e: ConfigError) -> Self {
        HubError::Config(e.to_string())
    }
}
