//! Account mount table
//!
//! Maps virtual paths to the accounts that serve them and synthesizes the
//! folders needed to reach mount points from above.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::driver::Driver;
use crate::error::{HubError, Result};
use crate::model::Object;
use crate::path;

/// Registry of mounted accounts, keyed by standardized virtual path
#[derive(Default)]
pub struct MountTable {
    accounts: RwLock<BTreeMap<String, Arc<dyn Driver>>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount an account at its virtual path
    ///
    /// Virtual paths must be unique; comparison ignores case.
    pub fn mount(&self, driver: Arc<dyn Driver>) -> Result<()> {
        let virtual_path = path::standardize(&driver.account().virtual_path);
        let mut accounts = self.accounts.write();
        if accounts
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(&virtual_path))
        {
            return Err(HubError::AlreadyExists(format!(
                "account already mounted at {}",
                virtual_path
            )));
        }
        info!(
            "Mounting {} account at {}",
            driver.config().name,
            virtual_path
        );
        accounts.insert(virtual_path, driver);
        Ok(())
    }

    /// Unmount the account at a virtual path
    pub fn unmount(&self, virtual_path: &str) -> Result<Arc<dyn Driver>> {
        let virtual_path = path::standardize(virtual_path);
        let removed = self.accounts.write().remove(&virtual_path);
        match removed {
            Some(driver) => {
                info!("Unmounted account at {}", virtual_path);
                Ok(driver)
            }
            None => Err(HubError::AccountNotFound(virtual_path)),
        }
    }

    /// Account mounted exactly at `virtual_path`
    pub fn get(&self, virtual_path: &str) -> Option<Arc<dyn Driver>> {
        self.accounts
            .read()
            .get(&path::standardize(virtual_path))
            .cloned()
    }

    /// All accounts ordered by index, then by virtual path
    pub fn accounts(&self) -> Vec<Arc<dyn Driver>> {
        let mut accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| {
            a.account()
                .index
                .cmp(&b.account().index)
                .then_with(|| a.account().virtual_path.cmp(&b.account().virtual_path))
        });
        accounts
    }

    pub fn count(&self) -> usize {
        self.accounts.read().len()
    }

    /// Find the account owning `raw_path` and the path relative to its root.
    ///
    /// The deepest mount containing the path wins.
    pub fn resolve(&self, raw_path: &str) -> Result<(Arc<dyn Driver>, String)> {
        let target = path::standardize(raw_path);
        let accounts = self.accounts.read();
        let (mount_path, driver) = accounts
            .iter()
            .filter(|(mount_path, _)| {
                mount_path.as_str() == target || path::is_sub_path(mount_path, &target)
            })
            .max_by_key(|(mount_path, _)| mount_path.len())
            .ok_or_else(|| HubError::AccountNotFound(target.clone()))?;

        let actual = if mount_path == "/" {
            target.clone()
        } else {
            path::standardize(&target[mount_path.len()..])
        };
        Ok((driver.clone(), actual))
    }

    /// Synthetic folders for mounts below `raw_path`
    ///
    /// Each mount contributes the first path segment under `raw_path`, so a
    /// mount at `/pub/a/b` shows up as `a` when listing `/pub`. Names are
    /// deduplicated, the lowest account index wins.
    pub fn virtual_children(&self, raw_path: &str) -> Vec<Object> {
        let prefix = path::standardize(raw_path);
        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        for driver in self.accounts() {
            let account = driver.account();
            if !path::is_sub_path(&prefix, &account.virtual_path) {
                continue;
            }
            let rest = if prefix == "/" {
                &account.virtual_path[1..]
            } else {
                &account.virtual_path[prefix.len() + 1..]
            };
            let name = rest.split('/').next().unwrap_or_default();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            objects.push(Object::folder(name, account.modified));
        }
        objects
    }
}
