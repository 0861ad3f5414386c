use crate::error::{Result, UpdaterError};
use serde::Deserialize;

/// One downloadable unit of a release.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Relative install path beneath the application directory.
    pub name: String,
    /// Source location of the artifact body.
    pub url: String,
    /// Expected SHA-256 digest, hex encoded; compared case-insensitively.
    pub sha256: String,
}

/// Remote descriptor of the latest release.
///
/// Fetched fresh on every check and never persisted; the manifest is the
/// sole source of truth for what "current" means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateManifest {
    /// Opaque, order-comparable version token.
    pub version: String,
    /// Artifacts to download, in install order. Never empty.
    pub artifacts: Vec<ArtifactRef>,
}

/// Wire shape covering both published schemas: a bare
/// `{version,url,sha256}` single-artifact release or an explicit
/// `{version, files: [...]}` list.
#[derive(Deserialize)]
struct RawManifest {
    version: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    files: Option<Vec<ArtifactRef>>,
}

impl UpdateManifest {
    /// Decode a manifest body, mapping the single-artifact schema onto an
    /// implicit entry named `default_artifact` (the client's executable).
    pub fn from_json(body: &[u8], default_artifact: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(body)?;

        let artifacts = match (raw.files, raw.url, raw.sha256) {
            (Some(files), _, _) => files,
            (None, Some(url), Some(sha256)) => vec![ArtifactRef {
                name: default_artifact.to_string(),
                url,
                sha256,
            }],
            (None, _, _) => {
                return Err(UpdaterError::manifest(
                    "manifest has neither a files list nor url/sha256 fields",
                ))
            }
        };

        let manifest = UpdateManifest {
            version: raw.version,
            artifacts,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.artifacts.is_empty() {
            return Err(UpdaterError::manifest("manifest lists no artifacts"));
        }
        for artifact in &self.artifacts {
            if artifact.name.trim().is_empty() {
                return Err(UpdaterError::manifest("artifact with empty name"));
            }
            if artifact.url.trim().is_empty() {
                return Err(UpdaterError::manifest(format!(
                    "artifact {} has an empty url",
                    artifact.name
                )));
            }
            if !is_sha256_hex(&artifact.sha256) {
                return Err(UpdaterError::manifest(format!(
                    "artifact {} has a malformed sha256 digest",
                    artifact.name
                )));
            }
        }
        Ok(())
    }
}

fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn parses_single_artifact_schema() {
        let body = format!(
            r#"{{"version":"1.0.29","url":"https://x/app.zip","sha256":"{DIGEST}"}}"#
        );
        let manifest = UpdateManifest::from_json(body.as_bytes(), "launcher.exe").unwrap();
        assert_eq!(manifest.version, "1.0.29");
        assert_eq!(manifest.artifacts.len(), 1);
        assert_eq!(manifest.artifacts[0].name, "launcher.exe");
        assert_eq!(manifest.artifacts[0].url, "https://x/app.zip");
    }

    #[test]
    fn parses_multi_artifact_schema() {
        let body = format!(
            r#"{{"version":"2.0.0","files":[
                {{"name":"launcher.exe","url":"https://x/a","sha256":"{DIGEST}"}},
                {{"name":"assets/background.png","url":"https://x/b","sha256":"{DIGEST}"}}
            ]}}"#
        );
        let manifest = UpdateManifest::from_json(body.as_bytes(), "launcher.exe").unwrap();
        assert_eq!(manifest.artifacts.len(), 2);
        assert_eq!(manifest.artifacts[1].name, "assets/background.png");
    }

    #[test]
    fn rejects_manifest_without_version() {
        let err = UpdateManifest::from_json(br#"{"url":"https://x","sha256":"00"}"#, "app")
            .unwrap_err();
        assert!(matches!(err, UpdaterError::ManifestDecode(_)));
    }

    #[test]
    fn rejects_manifest_without_artifacts() {
        let err = UpdateManifest::from_json(br#"{"version":"1.0.29"}"#, "app").unwrap_err();
        assert!(matches!(err, UpdaterError::Manifest(_)));

        let err = UpdateManifest::from_json(br#"{"version":"1.0.29","files":[]}"#, "app")
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Manifest(_)));
    }

    #[test]
    fn rejects_malformed_digest() {
        let body = r#"{"version":"1.0.29","url":"https://x/app.zip","sha256":"not-hex"}"#;
        let err = UpdateManifest::from_json(body.as_bytes(), "app").unwrap_err();
        assert!(matches!(err, UpdaterError::Manifest(_)));
    }

    #[test]
    fn rejects_truncated_body() {
        let err = UpdateManifest::from_json(b"{\"version\":", "app").unwrap_err();
        assert!(matches!(err, UpdaterError::ManifestDecode(_)));
    }
}
