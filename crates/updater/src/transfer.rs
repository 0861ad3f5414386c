use crate::error::Result;
use crate::manifest::ArtifactRef;
use crate::source::UpdateSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Ephemeral staging area for one coordinator run.
///
/// Downloaded artifact bodies live under a private temp directory until they
/// are handed to the installer by path. Dropping the session removes the
/// directory, on success and failure alike, so a partial download can never
/// be mistaken for an installable artifact.
pub struct TransferSession {
    dir: TempDir,
}

impl TransferSession {
    /// Create a fresh staging directory.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Staging path for the `index`-th manifest artifact. Index-based names
    /// keep staging independent of whatever the manifest calls its files.
    pub fn staging_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("artifact-{index:03}"))
    }

    /// Root of the staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// An artifact whose body has been fully written to the staging area.
#[derive(Debug)]
pub struct StagedArtifact {
    pub artifact: ArtifactRef,
    pub path: PathBuf,
}

/// Download every artifact sequentially into `session`, reporting an
/// aggregate percentage across the whole set.
///
/// Updates are rare and payloads small, so ordering and simplicity win over
/// parallel transfers. Each artifact contributes an equal share of the
/// percentage; an artifact with unknown length holds its share until
/// completion, so the reported value is monotone and always ends at 100.
pub async fn download_all<S>(
    source: &S,
    artifacts: &[ArtifactRef],
    session: &TransferSession,
    percent: &(dyn Fn(u8) + Send + Sync),
) -> Result<Vec<StagedArtifact>>
where
    S: UpdateSource + ?Sized,
{
    let count = artifacts.len() as u64;
    let mut staged = Vec::with_capacity(artifacts.len());

    for (index, artifact) in artifacts.iter().enumerate() {
        let dest = session.staging_path(index);
        debug!(name = %artifact.name, url = %artifact.url, "downloading artifact");

        let completed = index as u64;
        let report = move |done: u64, total: u64| {
            let share = if total > 0 {
                (done * 100 / total).min(100)
            } else {
                0
            };
            percent(((completed * 100 + share) / count) as u8);
        };

        if let Err(err) = source.download(&artifact.url, &dest, &report).await {
            // Never leave a half-written body where a later run might see it.
            if let Err(rm) = std::fs::remove_file(&dest) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = ?dest, error = %rm, "failed to remove partial download");
                }
            }
            return Err(err);
        }

        // Terminal signal even when the server sent no content length.
        percent(((completed + 1) * 100 / count) as u8);

        staged.push(StagedArtifact {
            artifact: artifact.clone(),
            path: dest,
        });
    }

    percent(100);
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdaterError;
    use crate::source::ProgressFn;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ChunkedSource {
        bodies: HashMap<String, Vec<u8>>,
        announce_length: bool,
        fail_halfway: bool,
    }

    #[async_trait]
    impl UpdateSource for ChunkedSource {
        async fn fetch_manifest(&self, _url: &str) -> crate::error::Result<Vec<u8>> {
            unimplemented!("not used by transfer tests")
        }

        async fn download(
            &self,
            url: &str,
            dest: &Path,
            progress: ProgressFn<'_>,
        ) -> crate::error::Result<()> {
            let body = self
                .bodies
                .get(url)
                .ok_or_else(|| UpdaterError::manifest("unknown url in test source"))?;
            let total = if self.announce_length {
                body.len() as u64
            } else {
                0
            };

            let half = body.len() / 2;
            std::fs::write(dest, &body[..half])?;
            progress(half as u64, total);
            if self.fail_halfway {
                return Err(UpdaterError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection dropped",
                )));
            }
            std::fs::write(dest, body)?;
            progress(body.len() as u64, total);
            Ok(())
        }
    }

    fn artifact(name: &str, url: &str) -> ArtifactRef {
        ArtifactRef {
            name: name.into(),
            url: url.into(),
            sha256: "0".repeat(64),
        }
    }

    #[tokio::test]
    async fn downloads_sequentially_and_ends_at_100() {
        let mut bodies = HashMap::new();
        bodies.insert("u/a".to_string(), vec![1u8; 100]);
        bodies.insert("u/b".to_string(), vec![2u8; 100]);
        let source = ChunkedSource {
            bodies,
            announce_length: true,
            fail_halfway: false,
        };

        let session = TransferSession::new().unwrap();
        let seen = Mutex::new(Vec::new());
        let staged = download_all(
            &source,
            &[artifact("a", "u/a"), artifact("b", "u/b")],
            &session,
            &|p| seen.lock().unwrap().push(p),
        )
        .await
        .unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(std::fs::read(&staged[1].path).unwrap(), vec![2u8; 100]);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed");
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn unknown_length_still_reaches_100() {
        let mut bodies = HashMap::new();
        bodies.insert("u/a".to_string(), vec![9u8; 64]);
        let source = ChunkedSource {
            bodies,
            announce_length: false,
            fail_halfway: false,
        };

        let session = TransferSession::new().unwrap();
        let seen = Mutex::new(Vec::new());
        download_all(&source, &[artifact("a", "u/a")], &session, &|p| {
            seen.lock().unwrap().push(p)
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap().last().unwrap(), 100);
    }

    #[tokio::test]
    async fn failed_transfer_removes_the_partial_file() {
        let mut bodies = HashMap::new();
        bodies.insert("u/a".to_string(), vec![7u8; 100]);
        let source = ChunkedSource {
            bodies,
            announce_length: true,
            fail_halfway: true,
        };

        let session = TransferSession::new().unwrap();
        let err = download_all(&source, &[artifact("a", "u/a")], &session, &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Io(_)));
        assert!(!session.staging_path(0).exists());
    }
}
