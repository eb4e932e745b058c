pub mod singleflight;
pub mod ttl;

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::model::{Link, Object};
use crate::path;

use self::singleflight::Group;
use self::ttl::TtlCache;

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// How long a directory listing stays cached (e.g. "30s", "60m")
    #[serde(default = "default_expiration", with = "humantime_serde")]
    pub expiration: Duration,
}

fn default_expiration() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration: default_expiration(),
        }
    }
}

/// Process-wide listing and link caches with their deduplication groups
///
/// Created once at startup and shared by reference with the storage facade.
/// Keys are the account's virtual path joined with the account-relative path.
#[derive(Debug)]
pub struct ObjectCache {
    config: CacheConfig,
    files: TtlCache<Vec<Object>>,
    files_group: Group<Vec<Object>>,
    links: TtlCache<Link>,
    links_group: Group<Link>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ObjectCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            files: TtlCache::new(),
            files_group: Group::new(),
            links: TtlCache::new(),
            links_group: Group::new(),
        }
    }

    /// Build the cache key for a path inside an account
    pub fn key(account_path: &str, path: &str) -> String {
        path::join(account_path, path)
    }

    pub fn listing_ttl(&self) -> Duration {
        self.config.expiration
    }

    pub fn files(&self) -> &TtlCache<Vec<Object>> {
        &self.files
    }

    pub fn files_group(&self) -> &Group<Vec<Object>> {
        &self.files_group
    }

    pub fn links(&self) -> &TtlCache<Link> {
        &self.links
    }

    pub fn links_group(&self) -> &Group<Link> {
        &self.links_group
    }

    /// Invalidate the cached listing of one directory
    pub fn clear(&self, account_path: &str, path: &str) {
        let key = Self::key(account_path, path);
        if self.files.delete(&key) {
            debug!("cleared listing cache for {}", key);
        }
    }

    /// Drop every cached listing and link
    pub fn clear_all(&self) {
        self.files.clear();
        self.links.clear();
    }
}
