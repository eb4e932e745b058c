pub mod local;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DriverSpec;
use crate::error::Result;
use crate::model::{Account, FileStream, Link, LinkArgs, Object, UpdateProgress};

use self::local::LocalDriver;
use self::memory::MemoryDriver;

/// Behaviour switches an account exposes to the storage facade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverConfig {
    /// Driver kind
    pub name: String,
    /// Sort listings in-process instead of trusting backend order
    pub local_sort: bool,
    /// Bypass the listing cache entirely
    pub no_cache: bool,
    /// Reject uploads and downloads into this account
    pub no_upload: bool,
}

/// How a driver identifies its root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootFolder {
    /// Backend-native id of the root
    Id(String),
    /// Backend path of the root
    Path(String),
}

/// Direct path resolution, for backends that do not need a parent listing
#[async_trait]
pub trait Getter: Send + Sync {
    async fn get(&self, path: &str) -> Result<Object>;
}

/// Core driver trait for storage backends
///
/// Drivers work on objects, not paths: the storage facade resolves paths to
/// objects (through listings, the root capability or [`Getter`]) and hands
/// the driver what it resolved. Optional capabilities are queried through the
/// methods with default implementations.
#[async_trait]
pub trait Driver: Send + Sync {
    /// The account this driver instance serves
    fn account(&self) -> &Account;

    fn config(&self) -> &DriverConfig;

    /// Root folder identity, if the driver advertises one
    fn root(&self) -> Option<RootFolder> {
        None
    }

    /// Direct-get capability, if the driver has one
    fn as_getter(&self) -> Option<&dyn Getter> {
        None
    }

    /// Whether objects with an empty id may be given their resolved path as id
    fn settable_id(&self) -> bool {
        false
    }

    /// List the children of a folder
    async fn list(&self, dir: &Object) -> Result<Vec<Object>>;

    /// Produce an access link for a file
    async fn link(&self, file: &Object, args: &LinkArgs) -> Result<Link>;

    /// Create `name` inside `parent`
    async fn make_dir(&self, parent: &Object, name: &str) -> Result<()>;

    /// Move `src` into the folder `dst_dir`
    async fn move_to(&self, src: &Object, dst_dir: &Object) -> Result<()>;

    async fn rename(&self, src: &Object, new_name: &str) -> Result<()>;

    /// Copy `src` into the folder `dst_dir`
    async fn copy(&self, src: &Object, dst_dir: &Object) -> Result<()>;

    async fn remove(&self, obj: &Object) -> Result<()>;

    /// Upload a stream into `dst_dir`, reporting progress in percent
    async fn put(
        &self,
        dst_dir: &Object,
        stream: &mut FileStream,
        progress: &UpdateProgress,
    ) -> Result<()>;
}

/// Instantiate the driver described by an account's configuration
pub fn build(account: Account, spec: &DriverSpec, config: DriverConfig) -> Result<Arc<dyn Driver>> {
    let driver: Arc<dyn Driver> = match spec {
        DriverSpec::Local(local) => Arc::new(LocalDriver::new(account, local.clone(), config)?),
        DriverSpec::Memory(memory) => Arc::new(MemoryDriver::new(account, memory.clone(), config)),
    };
    Ok(driver)
}
