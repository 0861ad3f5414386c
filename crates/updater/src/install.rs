use crate::error::{Result, UpdaterError};
use crate::transfer::StagedArtifact;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::{NamedTempFile, PathPersistError};
use tracing::debug;
#[cfg(not(unix))]
use tracing::warn;

/// Validate an artifact name as a relative install path.
///
/// Absolute paths and any `..` segment are rejected so a hostile manifest
/// cannot write outside the application directory.
pub fn artifact_install_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(UpdaterError::install(format!(
            "artifact name {name} is an absolute path"
        )));
    }

    let mut rel = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            _ => {
                return Err(UpdaterError::install(format!(
                    "artifact name {name} escapes the application directory"
                )))
            }
        }
    }
    if rel.as_os_str().is_empty() {
        return Err(UpdaterError::install("artifact name resolves to nothing"));
    }
    Ok(rel)
}

/// Stage every verified artifact into `app_dir` and swap it into place.
///
/// Two phases: first every body is copied to a temp file next to its final
/// destination (creating intermediate directories) and synced; only then is
/// each swapped in with a single rename. A crash mid-install therefore
/// leaves live files either old or new, never half-written.
pub fn install(staged: &[StagedArtifact], app_dir: &Path, executable_name: &str) -> Result<()> {
    if !app_dir.is_absolute() {
        return Err(UpdaterError::NonAbsolutePath(app_dir.to_path_buf()));
    }

    // Validate every name before touching the filesystem at all.
    let mut destinations = Vec::with_capacity(staged.len());
    for item in staged {
        destinations.push(app_dir.join(artifact_install_path(&item.artifact.name)?));
    }

    let mut prepared = Vec::with_capacity(staged.len());
    for (item, dest) in staged.iter().zip(destinations) {
        let parent = dest
            .parent()
            .ok_or_else(|| UpdaterError::install("destination has no parent directory"))?;
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }

        let mut temp = NamedTempFile::new_in(parent)?;
        let mut body = fs::File::open(&item.path)?;
        std::io::copy(&mut body, &mut temp)?;
        temp.flush()?;
        temp.as_file().sync_all()?;

        #[cfg(unix)]
        if item.artifact.name == executable_name {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = temp.as_file().metadata()?.permissions();
            perms.set_mode(0o755);
            temp.as_file().set_permissions(perms)?;
        }
        #[cfg(not(unix))]
        let _ = executable_name;

        prepared.push((temp.into_temp_path(), dest));
    }

    for (temp_path, dest) in prepared {
        debug!(dest = ?dest, "swapping artifact into place");
        swap_into_place(temp_path, &dest)?;
    }
    Ok(())
}

#[cfg(unix)]
fn swap_into_place(temp_path: tempfile::TempPath, dest: &Path) -> Result<()> {
    // Renaming over a running binary is allowed on Unix; the old inode
    // stays alive until the process exits.
    temp_path.persist(dest).map_err(map_persist_error)?;
    Ok(())
}

#[cfg(not(unix))]
fn swap_into_place(temp_path: tempfile::TempPath, dest: &Path) -> Result<()> {
    // The OS may refuse to overwrite an in-use file, but renaming it away
    // is permitted. Move the live file to a backup, move the new one in,
    // and roll back if that second rename fails.
    let interim = dest.with_extension("new");
    temp_path.persist(&interim).map_err(map_persist_error)?;

    let backup = if dest.exists() {
        let mut counter = 0usize;
        let mut candidate = dest.with_extension("old");
        while candidate.exists() {
            counter += 1;
            candidate = dest.with_extension(format!("old{counter}"));
        }
        fs::rename(dest, &candidate)?;
        Some(candidate)
    } else {
        None
    };

    if let Err(err) = fs::rename(&interim, dest) {
        if let Some(ref backup_path) = backup {
            let _ = fs::rename(backup_path, dest);
        }
        return Err(UpdaterError::Io(err));
    }

    if let Some(ref backup_path) = backup {
        if let Err(err) = fs::remove_file(backup_path) {
            // The old binary may stay locked until the process exits; leave
            // the backup behind rather than failing the install.
            warn!(path = ?backup_path, error = %err, "could not remove old file");
        }
    }
    Ok(())
}

fn map_persist_error(err: PathPersistError) -> UpdaterError {
    UpdaterError::Io(err.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArtifactRef;
    use tempfile::tempdir;

    fn staged(dir: &Path, name: &str, body: &[u8]) -> StagedArtifact {
        let path = dir.join(format!("staged-{}", name.replace('/', "_")));
        fs::write(&path, body).unwrap();
        StagedArtifact {
            artifact: ArtifactRef {
                name: name.into(),
                url: format!("https://x/{name}"),
                sha256: "0".repeat(64),
            },
            path,
        }
    }

    #[test]
    fn rejects_traversal_and_absolute_names() {
        assert!(artifact_install_path("../evil").is_err());
        assert!(artifact_install_path("assets/../../evil").is_err());
        assert!(artifact_install_path("/etc/passwd").is_err());
        assert!(artifact_install_path("").is_err());
        assert_eq!(
            artifact_install_path("assets/background.png").unwrap(),
            PathBuf::from("assets/background.png")
        );
    }

    #[test]
    fn installs_into_nested_directories() {
        let work = tempdir().unwrap();
        let app_dir = work.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();

        let items = vec![
            staged(work.path(), "launcher", b"new-binary"),
            staged(work.path(), "assets/background.png", b"pixels"),
        ];
        install(&items, &app_dir, "launcher").unwrap();

        assert_eq!(fs::read(app_dir.join("launcher")).unwrap(), b"new-binary");
        assert_eq!(
            fs::read(app_dir.join("assets/background.png")).unwrap(),
            b"pixels"
        );
    }

    #[test]
    fn overwrites_existing_files() {
        let work = tempdir().unwrap();
        let app_dir = work.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("launcher"), b"old-binary").unwrap();

        let items = vec![staged(work.path(), "launcher", b"new-binary")];
        install(&items, &app_dir, "launcher").unwrap();

        assert_eq!(fs::read(app_dir.join("launcher")).unwrap(), b"new-binary");
    }

    #[test]
    fn traversal_artifact_aborts_before_any_swap() {
        let work = tempdir().unwrap();
        let app_dir = work.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();

        let items = vec![
            staged(work.path(), "launcher", b"new-binary"),
            staged(work.path(), "../evil", b"nope"),
        ];
        let err = install(&items, &app_dir, "launcher").unwrap_err();
        assert!(matches!(err, UpdaterError::Install(_)));
        assert!(!app_dir.join("launcher").exists());
        assert!(!work.path().join("evil").exists());
    }

    #[cfg(unix)]
    #[test]
    fn executable_artifact_gets_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let work = tempdir().unwrap();
        let app_dir = work.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();

        let items = vec![
            staged(work.path(), "launcher", b"bin"),
            staged(work.path(), "readme.txt", b"text"),
        ];
        install(&items, &app_dir, "launcher").unwrap();

        let bin_mode = fs::metadata(app_dir.join("launcher"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(bin_mode & 0o111, 0o111);
    }
}
