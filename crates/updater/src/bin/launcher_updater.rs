//! Headless update pass for the launcher.
//!
//! Runs one check-download-install cycle against a release manifest and
//! exits 0 when the launcher is up to date or was updated, 1 otherwise.
//! The launcher itself embeds the `updater` crate; this binary exists for
//! scripted installs and for recovering a broken launcher by hand.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use updater::{
    HttpSource, UpdateConfig, UpdateCoordinator, UpdateObserver, UpdateOutcome, UpdateState,
};

#[derive(Default)]
struct LogObserver {
    last_decade: AtomicU8,
}

impl LogObserver {
    /// Log once per 10%-decade crossed, however coarse the chunking is; a
    /// transfer whose reports skip the exact multiples of ten still gets a
    /// line per decade.
    fn decade_crossed(&self, percent: u8) -> bool {
        let decade = percent / 10;
        self.last_decade.swap(decade, Ordering::Relaxed) != decade
    }
}

impl UpdateObserver for LogObserver {
    fn on_state_change(&self, state: UpdateState, detail: &str) {
        info!(%state, detail, "update state");
    }

    fn on_progress(&self, percent: u8) {
        if self.decade_crossed(percent) {
            info!(percent, "downloading");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if updater::skip_requested(&args) {
        info!("--skip-update present; not checking");
        return Ok(());
    }

    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    if positional.len() < 2 {
        bail!("usage: launcher-updater <manifest-url> <app-dir> [executable-name]");
    }
    let manifest_url = positional[0];
    let executable_name = positional
        .get(2)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "launcher".to_string());

    let app_dir = PathBuf::from(positional[1])
        .canonicalize()
        .with_context(|| format!("application directory {} does not exist", positional[1]))?;

    let source = HttpSource::builder().build()?;
    let mut config = UpdateConfig::new(manifest_url.as_str(), app_dir, executable_name);
    // A manual pass should never spawn the launcher behind the user's back.
    config.auto_relaunch = false;

    let coordinator = UpdateCoordinator::new(source, config);
    let observer = LogObserver::default();
    match coordinator.run(&observer).await? {
        UpdateOutcome::UpToDate => info!("already up to date"),
        UpdateOutcome::Updated { version } => info!(%version, "update installed"),
        UpdateOutcome::CheckFailed(err) => {
            warn!(error = %err, "update check failed");
            bail!("could not check for updates: {err}");
        }
        UpdateOutcome::AlreadyRunning => unreachable!("single run per invocation"),
    }
    Ok(())
}
