use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for mounthub operations
///
/// The enum is `Clone` so one backend failure can be handed to every caller
/// waiting on the same deduplicated request.
#[derive(Error, Debug, Clone)]
pub enum HubError {
    #[error("No account mounted for path: {0}")]
    AccountNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Not a folder: {0}")]
    NotFolder(String),

    #[error("Not a file: {0}")]
    NotFile(String),

    #[error("Upload not supported by account: {0}")]
    UploadNotSupported(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{op} [{path}]: {source}")]
    Op {
        op: &'static str,
        path: String,
        #[source]
        source: Box<HubError>,
    },

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Downloader error: {0}")]
    Downloader(String),

    #[error("Downloader is not ready")]
    DownloaderNotReady,

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

impl From<io::Error> for HubError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            return HubError::ObjectNotFound(e.to_string());
        }
        HubError::Io(Arc::new(e))
    }
}

impl HubError {
    /// Wrap an error with the operation and path that produced it
    pub fn context(self, op: &'static str, path: impl Into<String>) -> Self {
        HubError::Op {
            op,
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through `Op` wrappers
    pub fn root_cause(&self) -> &HubError {
        let mut err = self;
        while let HubError::Op { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_object_not_found(&self) -> bool {
        matches!(self.root_cause(), HubError::ObjectNotFound(_))
    }

    pub fn is_account_not_found(&self) -> bool {
        matches!(self.root_cause(), HubError::AccountNotFound(_))
    }

    pub fn is_not_folder(&self) -> bool {
        matches!(self.root_cause(), HubError::NotFolder(_))
    }

    pub fn is_not_file(&self) -> bool {
        matches!(self.root_cause(), HubError::NotFile(_))
    }
}

/// Extension for attaching operation context to results
pub trait ResultExt<T> {
    fn context(self, op: &'static str, path: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, op: &'static str, path: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(op, path))
    }
}

/// Result type alias for mounthub operations
pub type Result<T> = std::result::Result<T, HubError>;
