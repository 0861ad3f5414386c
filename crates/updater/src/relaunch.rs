use crate::error::{Result, UpdaterError};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::info;

/// Flag passed to the relaunched process so it skips its own startup
/// update check. Without it a manifest lagging behind the freshly installed
/// binary would relaunch the application in a loop.
pub const SKIP_UPDATE_FLAG: &str = "--skip-update";

/// Whether the given argv requests skipping the startup update check.
pub fn skip_requested<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().any(|a| a.as_ref() == SKIP_UPDATE_FLAG)
}

/// Resolve the executable to spawn after an install.
///
/// Falls back to the currently running binary when the expected path is
/// missing, so the user is never left with no running instance.
pub fn resolve_target(expected: &Path) -> Result<PathBuf> {
    if expected.exists() {
        return Ok(expected.to_path_buf());
    }
    std::env::current_exe()
        .map_err(|err| UpdaterError::Relaunch(format!("no executable to relaunch: {err}")))
}

/// Spawn the (now updated) executable with the skip-check marker appended.
///
/// The caller owns process teardown: once the child is running, exit the
/// current process so the swap of any still-locked files can complete.
pub fn relaunch(executable: &Path, extra_args: &[String]) -> Result<Child> {
    let target = resolve_target(executable)?;
    info!(target = ?target, "relaunching into updated version");
    Command::new(&target)
        .args(extra_args)
        .arg(SKIP_UPDATE_FLAG)
        .spawn()
        .map_err(|err| UpdaterError::Relaunch(format!("failed to spawn {target:?}: {err}")))
}
