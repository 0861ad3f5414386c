use std::path::PathBuf;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while performing an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// The manifest was unreachable, incomplete, or otherwise unusable.
    #[error("manifest error: {0}")]
    Manifest(String),
    /// The manifest could not be decoded from JSON.
    #[error("manifest decoding failed: {0}")]
    ManifestDecode(#[from] serde_json::Error),
    /// A transfer-level network failure (connect, read, timeout, bad status).
    #[error("network transfer failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The downloaded artifact hash did not match the manifest.
    #[error("integrity check failed for {name} (expected {expected}, got {actual})")]
    IntegrityMismatch {
        /// Artifact whose digest did not match.
        name: String,
        /// Expected SHA-256 digest.
        expected: String,
        /// Actual SHA-256 digest.
        actual: String,
    },
    /// Installation failed: bad artifact path, staging or swap error.
    #[error("install failed: {0}")]
    Install(String),
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// The new process could not be spawned after a successful install.
    #[error("relaunch failed: {0}")]
    Relaunch(String),
    /// Attempted to install into a non-absolute application directory.
    #[error("application directory must be absolute: {0}")]
    NonAbsolutePath(PathBuf),
}

impl UpdaterError {
    /// Helper for wrapping manifest validation failures.
    pub fn manifest(msg: impl Into<String>) -> Self {
        UpdaterError::Manifest(msg.into())
    }

    /// Helper for wrapping installation failures.
    pub fn install(msg: impl Into<String>) -> Self {
        UpdaterError::Install(msg.into())
    }

    /// Whether this error may be recovered by staying on the current version
    /// and retrying on the next start (check-phase failures).
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            UpdaterError::Manifest(_) | UpdaterError::ManifestDecode(_) | UpdaterError::Network(_)
        )
    }
}
