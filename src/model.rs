//! Objects, links, accounts and the other values passed between layers

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::AsyncRead;
use tracing::error;

/// A file or folder as reported by a driver or synthesized by the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Backend-native identity. May be empty until resolved through `get`.
    pub id: String,
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_folder: bool,
}

impl Object {
    pub fn file(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            size,
            modified,
            is_folder: false,
        }
    }

    pub fn folder(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            size: 0,
            modified,
            is_folder: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_dir(&self) -> bool {
        self.is_folder
    }
}

/// Content access descriptor for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// URL or local reference
    pub url: String,
    /// Headers the consumer must send along with the request
    pub headers: HashMap<String, String>,
    /// Validity measured from when the driver produced the link.
    /// `None` means the link is never cached.
    pub expiration: Option<Duration>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            expiration: None,
        }
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }
}

/// Caller details a driver may need to build a link
#[derive(Debug, Clone, Default)]
pub struct LinkArgs {
    pub ip: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Sort key for local sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Name,
    Size,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Post-processing applied to a listing after sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractFolder {
    #[default]
    None,
    /// Folders first
    Front,
    /// Folders last
    Back,
    /// Replace folders holding a single child by that child
    Flatten,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    pub order_by: Option<OrderBy>,
    pub order_direction: OrderDirection,
    pub extract_folder: ExtractFolder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxy {
    pub web_proxy: bool,
    pub webdav_policy: String,
    pub down_proxy_url: String,
}

impl Proxy {
    pub fn webdav_302(&self) -> bool {
        self.webdav_policy == "302_redirect"
    }

    pub fn webdav_proxy(&self) -> bool {
        self.webdav_policy == "use_proxy_url"
    }

    pub fn webdav_native(&self) -> bool {
        !self.webdav_302() && !self.webdav_proxy()
    }
}

/// A mounted backend instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: u32,
    /// Standardized mount path, unique across accounts
    pub virtual_path: String,
    /// Ordering among sibling mounts
    pub index: i32,
    /// Driver kind, e.g. "local"
    pub driver: String,
    pub status: String,
    /// Driver-specific configuration blob
    pub addition: String,
    pub remark: String,
    pub modified: DateTime<Utc>,
    pub sort: Sort,
    pub proxy: Proxy,
}

impl Account {
    pub fn new(id: u32, virtual_path: &str, driver: &str) -> Self {
        Self {
            id,
            virtual_path: crate::path::standardize(virtual_path),
            index: 0,
            driver: driver.to_string(),
            status: "work".to_string(),
            addition: String::new(),
            remark: String::new(),
            modified: Utc::now(),
            sort: Sort::default(),
            proxy: Proxy::default(),
        }
    }
}

/// Visibility policy for a directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Meta {
    pub path: String,
    /// Newline-separated regular expressions matched against entry names
    #[serde(default)]
    pub hide: String,
    /// Whether the policy also applies below `path`
    #[serde(default)]
    pub h_sub: bool,
}

/// Progress callback handed to drivers during upload, in percent
pub type UpdateProgress = Box<dyn Fn(f64) + Send + Sync>;

/// An upload source.
///
/// When `temp_path` is set the stream is backed by a temporary file which is
/// deleted by [`FileStream::release`].
pub struct FileStream {
    pub name: String,
    pub size: u64,
    pub mimetype: String,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    pub temp_path: Option<PathBuf>,
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mimetype", &self.mimetype)
            .field("temp_path", &self.temp_path)
            .finish()
    }
}

impl FileStream {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        reader: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mimetype: "application/octet-stream".to_string(),
            reader: Box::pin(reader),
            temp_path: None,
        }
    }

    /// Open a file on disk that should be removed once uploaded
    pub async fn from_temp_file(path: PathBuf) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut stream = Self::new(name, size, file);
        stream.temp_path = Some(path);
        Ok(stream)
    }

    /// Close the reader and delete the backing temporary file, if any
    pub fn release(self) {
        let FileStream {
            reader, temp_path, ..
        } = self;
        drop(reader);
        if let Some(path) = temp_path {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!("failed to remove temp file {:?}: {}", path, e);
                }
            }
        }
    }
}
