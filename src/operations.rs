//! Storage operations facade
//!
//! Path-based operations on a single account. Paths are relative to the
//! account root; resolution to objects goes through cached, deduplicated
//! listings unless the driver can resolve paths itself.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, trace};

use crate::cache::ObjectCache;
use crate::driver::{Driver, RootFolder};
use crate::error::{HubError, Result, ResultExt};
use crate::model::{FileStream, Link, LinkArgs, Object, UpdateProgress};
use crate::path;

/// Composes the object cache, the deduplication groups and a driver
pub struct StorageOps {
    cache: Arc<ObjectCache>,
}

impl StorageOps {
    pub fn new(cache: Arc<ObjectCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Invalidate the cached listing of `path` inside the driver's account
    pub fn clear_cache(&self, driver: &dyn Driver, path: &str) {
        self.cache.clear(&driver.account().virtual_path, path);
    }

    /// List a directory
    ///
    /// `refresh` skips the cache read but still stores the fresh listing.
    pub async fn list(&self, driver: &dyn Driver, path: &str, refresh: bool) -> Result<Vec<Object>> {
        let path = path::standardize(path);
        debug!("operations list: {}", path);
        let dir = self.get(driver, &path).await.context("list", &path)?;
        if !dir.is_dir() {
            return Err(HubError::NotFolder(path));
        }
        if driver.config().no_cache {
            return driver.list(&dir).await.context("list", &path);
        }

        let key = ObjectCache::key(&driver.account().virtual_path, &path);
        if !refresh {
            if let Some(files) = self.cache.files().get(&key) {
                trace!("listing cache hit: {}", key);
                return Ok(files);
            }
        }

        let cache = &self.cache;
        let dir = &dir;
        let cache_key = &key;
        self.cache
            .files_group()
            .work(&key, move || async move {
                let files = driver.list(dir).await?;
                cache
                    .files()
                    .set(cache_key.clone(), files.clone(), cache.listing_ttl());
                Ok(files)
            })
            .await
            .context("list", &path)
    }

    /// Resolve a path to an object
    pub fn get<'a>(&'a self, driver: &'a dyn Driver, path: &'a str) -> BoxFuture<'a, Result<Object>> {
        async move {
            let path = path::standardize(path);
            trace!("operations get: {}", path);
            if let Some(getter) = driver.as_getter() {
                return getter.get(&path).await;
            }
            if let Some(root) = root_object(driver, &path) {
                return Ok(root);
            }

            let (parent, name) = path::split(&path);
            let files = self.list(driver, &parent, false).await?;
            let mut found = files
                .into_iter()
                .find(|f| f.name == name)
                .ok_or_else(|| HubError::ObjectNotFound(path.clone()))?;
            // Cached listings keep empty ids; only the returned copy gets one.
            if found.id.is_empty() && driver.settable_id() {
                found.id = path;
            }
            Ok(found)
        }
        .boxed()
    }

    /// Produce an access link for a file, returning the resolved file too
    pub async fn link(
        &self,
        driver: &dyn Driver,
        path: &str,
        args: &LinkArgs,
    ) -> Result<(Link, Object)> {
        let path = path::standardize(path);
        debug!("operations link: {}", path);
        let file = self.get(driver, &path).await.context("link", &path)?;
        if file.is_dir() {
            return Err(HubError::NotFile(path));
        }

        let key = ObjectCache::key(&driver.account().virtual_path, &path);
        if let Some(link) = self.cache.links().get(&key) {
            trace!("link cache hit: {}", key);
            return Ok((link, file));
        }

        let cache = &self.cache;
        let target = &file;
        let cache_key = &key;
        let link = self
            .cache
            .links_group()
            .work(&key, move || async move {
                let link = driver.link(target, args).await?;
                if let Some(ttl) = link.expiration {
                    cache.links().set(cache_key.clone(), link.clone(), ttl);
                }
                Ok(link)
            })
            .await
            .context("link", &path)?;
        Ok((link, file))
    }

    /// Create a directory and any missing ancestors
    ///
    /// Succeeds without effect when the directory already exists.
    pub fn make_dir<'a>(&'a self, driver: &'a dyn Driver, path: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let path = path::standardize(path);
            match self.get(driver, &path).await {
                Ok(obj) if obj.is_dir() => Ok(()),
                Ok(_) => Err(HubError::AlreadyExists(path.clone()).context("make dir", path)),
                Err(e) if e.is_object_not_found() && !path::is_root(&path) => {
                    let (parent, name) = path::split(&path);
                    self.make_dir(driver, &parent).await?;
                    let parent_dir = self
                        .get(driver, &parent)
                        .await
                        .context("make dir", &parent)?;
                    debug!("operations make dir: {}", path);
                    let created = driver.make_dir(&parent_dir, &name).await;
                    self.clear_cache(driver, &parent);
                    if let Err(e) = created {
                        // A concurrent caller may have created it first.
                        return match self.get(driver, &path).await {
                            Ok(obj) if obj.is_dir() => {
                                debug!("make dir {} raced with another caller", path);
                                Ok(())
                            }
                            _ => Err(e.context("make dir", path)),
                        };
                    }
                    Ok(())
                }
                Err(e) => Err(e.context("make dir", path)),
            }
        }
        .boxed()
    }

    /// Move `src_path` into the directory `dst_dir_path`
    pub async fn move_to(&self, driver: &dyn Driver, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let src = self.get(driver, src_path).await.context("move", src_path)?;
        let dst_dir = self
            .get(driver, dst_dir_path)
            .await
            .context("move", dst_dir_path)?;
        driver
            .move_to(&src, &dst_dir)
            .await
            .context("move", src_path)?;
        self.clear_cache(driver, &path::split(src_path).0);
        self.clear_cache(driver, dst_dir_path);
        Ok(())
    }

    pub async fn rename(&self, driver: &dyn Driver, src_path: &str, new_name: &str) -> Result<()> {
        let src = self.get(driver, src_path).await.context("rename", src_path)?;
        driver
            .rename(&src, new_name)
            .await
            .context("rename", src_path)?;
        self.clear_cache(driver, &path::split(src_path).0);
        Ok(())
    }

    /// Copy `src_path` into the directory `dst_dir_path`
    pub async fn copy(&self, driver: &dyn Driver, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let src = self.get(driver, src_path).await.context("copy", src_path)?;
        let dst_dir = self
            .get(driver, dst_dir_path)
            .await
            .context("copy", dst_dir_path)?;
        driver
            .copy(&src, &dst_dir)
            .await
            .context("copy", src_path)?;
        self.clear_cache(driver, dst_dir_path);
        Ok(())
    }

    /// Remove an object; removing something that does not exist succeeds
    pub async fn remove(&self, driver: &dyn Driver, path: &str) -> Result<()> {
        let obj = match self.get(driver, path).await {
            Ok(obj) => obj,
            Err(e) if e.is_object_not_found() => return Ok(()),
            Err(e) => return Err(e.context("remove", path)),
        };
        driver.remove(&obj).await.context("remove", path)?;
        self.clear_cache(driver, &path::split(path).0);
        Ok(())
    }

    /// Upload a stream into `dst_dir_path`, creating the directory if needed
    ///
    /// The stream and its backing temporary file are released on every exit.
    pub async fn put(
        &self,
        driver: &dyn Driver,
        dst_dir_path: &str,
        stream: FileStream,
        progress: Option<UpdateProgress>,
    ) -> Result<()> {
        let mut stream = scopeguard::guard(stream, FileStream::release);
        self.make_dir(driver, dst_dir_path)
            .await
            .context("put", dst_dir_path)?;
        let dst_dir = self
            .get(driver, dst_dir_path)
            .await
            .context("put", dst_dir_path)?;
        let progress = progress.unwrap_or_else(|| Box::new(|_| {}));
        if let Err(e) = driver.put(&dst_dir, &mut *stream, &progress).await {
            error!("put {} into {} failed: {}", stream.name, dst_dir_path, e);
            return Err(e.context("put", dst_dir_path));
        }
        debug!("put file [{}] done", stream.name);
        self.clear_cache(driver, dst_dir_path);
        Ok(())
    }
}

/// Synthesize the account root without asking the backend
fn root_object(driver: &dyn Driver, path: &str) -> Option<Object> {
    let id = match driver.root() {
        Some(RootFolder::Id(id)) if path::is_root(path) => id,
        Some(RootFolder::Path(root)) if is_root_path(path, &root) => root,
        _ if path::is_root(path) => String::new(),
        _ => return None,
    };
    Some(Object::folder("root", driver.account().modified).with_id(id))
}

fn is_root_path(path: &str, root: &str) -> bool {
    path::is_root(path) || path::path_equal(path, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::CacheConfig;
    use crate::config::MemoryDriverConfig;
    use crate::driver::memory::MemoryDriver;
    use crate::driver::DriverConfig;
    use crate::model::Account;

    fn ops() -> StorageOps {
        StorageOps::new(Arc::new(ObjectCache::default()))
    }

    fn memory(memory: MemoryDriverConfig, config: DriverConfig) -> MemoryDriver {
        MemoryDriver::new(Account::new(1, "/mem", "memory"), memory, config)
    }

    fn driver() -> MemoryDriver {
        memory(MemoryDriverConfig::default(), DriverConfig::default())
    }

    #[tokio::test]
    async fn test_concurrent_lists_share_one_backend_call() {
        let ops = ops();
        let d = driver().with_list_delay(Duration::from_millis(50));
        d.add_file("/a.txt", "a");

        let calls = (0..8).map(|_| ops.list(&d, "/", false));
        let results = futures::future::join_all(calls).await;

        assert_eq!(d.list_calls(), 1);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.len(), 1);
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_expires_after_ttl() {
        let ops = StorageOps::new(Arc::new(ObjectCache::new(CacheConfig {
            expiration: Duration::from_secs(10),
        })));
        let d = driver();
        d.add_file("/a.txt", "a");

        ops.list(&d, "/", false).await.unwrap();
        ops.list(&d, "/", false).await.unwrap();
        assert_eq!(d.list_calls(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        ops.list(&d, "/", false).await.unwrap();
        assert_eq!(d.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_and_no_cache_reach_backend() {
        let ops = ops();
        let d = driver();
        ops.list(&d, "/", false).await.unwrap();
        ops.list(&d, "/", true).await.unwrap();
        assert_eq!(d.list_calls(), 2);

        let uncached = memory(
            MemoryDriverConfig::default(),
            DriverConfig {
                no_cache: true,
                ..Default::default()
            },
        );
        ops.list(&uncached, "/", false).await.unwrap();
        ops.list(&uncached, "/", false).await.unwrap();
        assert_eq!(uncached.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_list_file_is_not_folder() {
        let ops = ops();
        let d = driver();
        d.add_file("/a.txt", "a");
        let err = ops.list(&d, "/a.txt", false).await.unwrap_err();
        assert!(err.is_not_folder());
    }

    #[tokio::test]
    async fn test_root_synthesized_from_root_id() {
        let ops = ops();
        let d = memory(
            MemoryDriverConfig {
                root_folder_id: "root-id".to_string(),
                ..Default::default()
            },
            DriverConfig::default(),
        );
        let root = ops.get(&d, "/").await.unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.id, "root-id");
        assert_eq!(root.size, 0);
        assert!(root.is_folder);
        assert_eq!(root.modified, d.account().modified);
        assert_eq!(d.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_scan_assigns_id_to_returned_copy_only() {
        let ops = ops();
        let d = driver();
        d.add_file("/a/b.txt", "data");

        let obj = ops.get(&d, "/a/b.txt").await.unwrap();
        assert_eq!(obj.id, "/a/b.txt");
        assert_eq!(obj.size, 4);

        let cached = ops.cache().files().get("/mem/a").unwrap();
        assert!(cached.iter().all(|o| o.id.is_empty()));
    }

    #[tokio::test]
    async fn test_get_missing_is_object_not_found() {
        let ops = ops();
        let d = driver();
        let err = ops.get(&d, "/nope").await.unwrap_err();
        assert!(err.is_object_not_found());
    }

    #[tokio::test]
    async fn test_make_dir_creates_parents_in_order() {
        let ops = ops();
        let d = driver();

        ops.make_dir(&d, "/a/b/c").await.unwrap();
        assert_eq!(d.created_dirs(), vec!["/a", "/a/b", "/a/b/c"]);

        ops.make_dir(&d, "/a/b/c").await.unwrap();
        assert_eq!(d.created_dirs().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_make_dir_of_same_path() {
        let ops = ops();
        let d = driver().with_list_delay(Duration::from_millis(10));

        let (a, b, c) = tokio::join!(
            ops.make_dir(&d, "/new/dir"),
            ops.make_dir(&d, "/new/dir"),
            ops.make_dir(&d, "/new/dir"),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(d.created_dirs(), vec!["/new", "/new/dir"]);
    }

    #[tokio::test]
    async fn test_make_dir_over_file_fails() {
        let ops = ops();
        let d = driver();
        d.add_file("/a", "x");
        let err = ops.make_dir(&d, "/a").await.unwrap_err();
        assert!(matches!(err.root_cause(), HubError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let ops = ops();
        let d = driver();
        ops.remove(&d, "/missing/file").await.unwrap();
    }

    #[tokio::test]
    async fn test_mutations_invalidate_listings() {
        let ops = ops();
        let d = driver();
        d.add_file("/src/f.txt", "x");
        d.add_folder("/dst");

        ops.list(&d, "/dst", false).await.unwrap();
        ops.move_to(&d, "/src/f.txt", "/dst").await.unwrap();
        let names: Vec<_> = ops
            .list(&d, "/dst", false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["f.txt"]);
        assert!(ops.list(&d, "/src", false).await.unwrap().is_empty());

        ops.rename(&d, "/dst/f.txt", "g.txt").await.unwrap();
        assert_eq!(ops.get(&d, "/dst/g.txt").await.unwrap().name, "g.txt");

        ops.copy(&d, "/dst/g.txt", "/src").await.unwrap();
        assert!(ops.get(&d, "/src/g.txt").await.is_ok());

        ops.remove(&d, "/src/g.txt").await.unwrap();
        assert!(ops.get(&d, "/src/g.txt").await.unwrap_err().is_object_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_cached_until_expiration() {
        let ops = ops();
        let d = memory(
            MemoryDriverConfig {
                link_ttl: Some(Duration::from_secs(10)),
                ..Default::default()
            },
            DriverConfig::default(),
        );
        d.add_file("/f.bin", "x");

        let (link, file) = ops.link(&d, "/f.bin", &LinkArgs::default()).await.unwrap();
        assert_eq!(link.url, "memory:///mem/f.bin");
        assert_eq!(file.name, "f.bin");
        ops.link(&d, "/f.bin", &LinkArgs::default()).await.unwrap();
        assert_eq!(d.link_calls(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(ops.cache().links().get("/mem/f.bin").is_none());
        ops.link(&d, "/f.bin", &LinkArgs::default()).await.unwrap();
        assert_eq!(d.link_calls(), 2);
    }

    #[tokio::test]
    async fn test_link_without_expiration_is_not_cached() {
        let ops = ops();
        let d = driver();
        d.add_file("/f.bin", "x");
        ops.link(&d, "/f.bin", &LinkArgs::default()).await.unwrap();
        ops.link(&d, "/f.bin", &LinkArgs::default()).await.unwrap();
        assert_eq!(d.link_calls(), 2);
    }

    #[tokio::test]
    async fn test_link_on_folder_is_not_file() {
        let ops = ops();
        let d = driver();
        d.add_folder("/dir");
        let err = ops.link(&d, "/dir", &LinkArgs::default()).await.unwrap_err();
        assert!(err.is_not_file());
    }

    #[tokio::test]
    async fn test_put_creates_destination_and_releases_temp_file() {
        let ops = ops();
        let d = driver();
        let tmp = tempfile::tempdir().unwrap();
        let staged = tmp.path().join("movie.mkv");
        std::fs::write(&staged, b"frames").unwrap();

        ops.list(&d, "/", false).await.unwrap();
        let stream = FileStream::from_temp_file(staged.clone()).await.unwrap();
        ops.put(&d, "/videos/new", stream, None).await.unwrap();

        assert_eq!(d.read("/videos/new/movie.mkv").unwrap(), &b"frames"[..]);
        assert!(!staged.exists());
        let names: Vec<_> = ops
            .list(&d, "/videos/new", false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["movie.mkv"]);
    }

    #[tokio::test]
    async fn test_put_releases_temp_file_on_failure() {
        let ops = ops();
        let d = driver();
        d.add_file("/blocked", "file in the way");
        let tmp = tempfile::tempdir().unwrap();
        let staged = tmp.path().join("data.bin");
        std::fs::write(&staged, b"x").unwrap();

        let stream = FileStream::from_temp_file(staged.clone()).await.unwrap();
        assert!(ops.put(&d, "/blocked", stream, None).await.is_err());
        assert!(!staged.exists());
    }
}
