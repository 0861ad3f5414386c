use crate::error::{Result, UpdaterError};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const INSTALLED_VERSION_KEY: &str = "installed_version";

/// Durable record of the last fully-installed version.
///
/// Lives inside the launcher's shared config file, so every key other than
/// `installed_version` is carried through writes untouched. Writes replace
/// the whole file atomically; there is never a partially-written config on
/// disk.
#[derive(Debug)]
pub struct InstalledState {
    path: PathBuf,
    installed_version: Option<String>,
    extra: Map<String, Value>,
}

impl InstalledState {
    /// Load the state from `path`. A missing file is an empty state, not an
    /// error; the first successful install creates it.
    pub fn load(path: &Path) -> Result<Self> {
        let mut extra = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes)
                .map_err(|err| UpdaterError::install(format!("config file is not a JSON object: {err}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(UpdaterError::Io(err)),
        };

        let installed_version = match extra.remove(INSTALLED_VERSION_KEY) {
            Some(Value::String(v)) => Some(v),
            _ => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            installed_version,
            extra,
        })
    }

    /// Version token of the artifacts currently on disk, if any install has
    /// ever completed.
    pub fn installed_version(&self) -> Option<&str> {
        self.installed_version.as_deref()
    }

    /// Record `version` as fully installed and persist the whole config
    /// file atomically (temp file, then a single rename into place).
    pub fn commit_version(&mut self, version: &str) -> Result<()> {
        self.installed_version = Some(version.to_string());

        let mut doc = self.extra.clone();
        doc.insert(
            INSTALLED_VERSION_KEY.to_string(),
            Value::String(version.to_string()),
        );

        let parent = self
            .path
            .parent()
            .ok_or_else(|| UpdaterError::install("state path has no parent directory"))?;
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }

        let mut temp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut temp, &Value::Object(doc))
            .map_err(|err| UpdaterError::install(format!("could not serialize config: {err}")))?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|err| UpdaterError::Io(err.error))?;
        Ok(())
    }
}
