use crate::error::{Result, UpdaterError};
use crate::install;
use crate::manifest::UpdateManifest;
use crate::relaunch;
use crate::source::UpdateSource;
use crate::state::InstalledState;
use crate::transfer::{self, StagedArtifact, TransferSession};
use crate::verify;
use crate::version;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task;
use tracing::{info, warn};

/// States of one update run, in the order the happy path visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Verifying,
    Installing,
    Relaunching,
    Failed,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up to date",
            UpdateState::UpdateAvailable => "update available",
            UpdateState::Downloading => "downloading",
            UpdateState::Verifying => "verifying",
            UpdateState::Installing => "installing",
            UpdateState::Relaunching => "relaunching",
            UpdateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Callbacks consumed by the host UI. The core never depends on a UI type;
/// it only pushes events through this seam.
pub trait UpdateObserver: Send + Sync {
    fn on_state_change(&self, state: UpdateState, detail: &str) {
        let _ = (state, detail);
    }
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }
}

/// Observer that ignores everything, for headless runs.
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {}

/// Configuration for one coordinator.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Location of the release manifest.
    pub manifest_url: String,
    /// Live application directory artifacts install into.
    pub app_dir: PathBuf,
    /// Shared JSON config file holding `installed_version`.
    pub state_path: PathBuf,
    /// Executable name inside `app_dir`; also the implicit artifact name
    /// for single-artifact manifests and the relaunch target.
    pub executable_name: String,
    /// Extra arguments forwarded to the relaunched process.
    pub relaunch_args: Vec<String>,
    /// Whether the coordinator spawns the new version itself after a
    /// successful install. Hosts that manage their own restart disable it.
    pub auto_relaunch: bool,
}

impl UpdateConfig {
    pub fn new(
        manifest_url: impl Into<String>,
        app_dir: impl Into<PathBuf>,
        executable_name: impl Into<String>,
    ) -> Self {
        let app_dir = app_dir.into();
        let state_path = app_dir.join("config.json");
        Self {
            manifest_url: manifest_url.into(),
            app_dir,
            state_path,
            executable_name: executable_name.into(),
            relaunch_args: Vec::new(),
            auto_relaunch: true,
        }
    }
}

/// How one coordinator run ended.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Manifest agreed with the installed version; nothing to do.
    UpToDate,
    /// Every artifact was installed and recorded; if relaunching was
    /// enabled the new process is already running and the host should exit.
    Updated { version: String },
    /// The check itself failed; the application keeps running the current
    /// version and will retry on the next start.
    CheckFailed(UpdaterError),
    /// Another run is in flight; this call was a no-op.
    AlreadyRunning,
}

/// Orchestrates check, download, verify, install and relaunch as one state
/// machine with a single observer.
pub struct UpdateCoordinator<S> {
    source: S,
    config: UpdateConfig,
    in_flight: AtomicBool,
}

impl<S> UpdateCoordinator<S>
where
    S: UpdateSource,
{
    pub fn new(source: S, config: UpdateConfig) -> Self {
        Self {
            source,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one full update pass.
    ///
    /// Check-phase failures come back as [`UpdateOutcome::CheckFailed`]
    /// (the launcher stays usable on its current version); failures past
    /// the check are `Err` and the observer has already seen a `Failed`
    /// transition whose detail distinguishes checksum from network from
    /// disk problems. Only one run is ever active; a second call while one
    /// is in flight is a no-op.
    pub async fn run(&self, observer: &dyn UpdateObserver) -> Result<UpdateOutcome> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(UpdateOutcome::AlreadyRunning);
        }
        // Clear the flag on every exit path, unwinding included; a panicked
        // run must not wedge the coordinator forever.
        struct InFlightGuard<'a>(&'a AtomicBool);
        impl Drop for InFlightGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.run_inner(observer).await
    }

    async fn run_inner(&self, observer: &dyn UpdateObserver) -> Result<UpdateOutcome> {
        observer.on_state_change(UpdateState::Checking, "checking for updates");

        let (mut state, manifest) = match self.check().await {
            Ok(checked) => checked,
            Err(err) => {
                warn!(error = %err, "update check failed; continuing on current version");
                observer.on_state_change(UpdateState::Failed, &err.to_string());
                return Ok(UpdateOutcome::CheckFailed(err));
            }
        };

        if !version::needs_update(state.installed_version(), &manifest.version) {
            info!(version = ?state.installed_version(), "already up to date");
            observer.on_state_change(UpdateState::UpToDate, "no update needed");
            return Ok(UpdateOutcome::UpToDate);
        }

        info!(
            installed = ?state.installed_version(),
            latest = %manifest.version,
            artifacts = manifest.artifacts.len(),
            "update available"
        );
        observer.on_state_change(
            UpdateState::UpdateAvailable,
            &format!("version {} available", manifest.version),
        );

        observer.on_state_change(UpdateState::Downloading, "downloading artifacts");
        let session = TransferSession::new()?;
        let staged = transfer::download_all(&self.source, &manifest.artifacts, &session, &|p| {
            observer.on_progress(p)
        })
        .await
        .map_err(|err| self.fail(observer, err))?;

        observer.on_state_change(UpdateState::Verifying, "verifying artifact digests");
        // Digest computation reads whole files; like the install step it
        // runs off the async threads.
        let staged = task::spawn_blocking(move || -> Result<Vec<StagedArtifact>> {
            for item in &staged {
                let actual = verify::file_sha256(&item.path)?;
                if !verify::digest_matches(&actual, &item.artifact.sha256) {
                    return Err(UpdaterError::IntegrityMismatch {
                        name: item.artifact.name.clone(),
                        expected: item.artifact.sha256.to_ascii_lowercase(),
                        actual,
                    });
                }
            }
            Ok(staged)
        })
        .await
        .map_err(|err| UpdaterError::install(format!("verify task failed: {err}")))
        .and_then(|inner| inner)
        .map_err(|err| self.fail(observer, err))?;

        observer.on_state_change(UpdateState::Installing, "installing artifacts");
        let app_dir = self.config.app_dir.clone();
        let executable_name = self.config.executable_name.clone();
        // Blocking filesystem work happens off the async threads; the
        // session must stay alive until the install task is done because
        // the staged paths live inside it.
        let install_result = task::spawn_blocking(move || {
            install::install(&staged, &app_dir, &executable_name)
        })
        .await
        .map_err(|err| UpdaterError::install(format!("install task failed: {err}")));
        drop(session);
        install_result
            .and_then(|inner| inner)
            .map_err(|err| self.fail(observer, err))?;

        state
            .commit_version(&manifest.version)
            .map_err(|err| self.fail(observer, err))?;
        info!(version = %manifest.version, "update installed");

        if self.config.auto_relaunch {
            observer.on_state_change(UpdateState::Relaunching, "restarting into new version");
            let executable = self.config.app_dir.join(&self.config.executable_name);
            if let Err(err) = relaunch::relaunch(&executable, &self.config.relaunch_args) {
                // The on-disk version and the running version now differ;
                // this one must reach the user, not just the log.
                observer.on_state_change(
                    UpdateState::Failed,
                    &format!("update installed but relaunch failed; restart manually ({err})"),
                );
                return Err(err);
            }
        }

        Ok(UpdateOutcome::Updated {
            version: manifest.version,
        })
    }

    async fn check(&self) -> Result<(InstalledState, UpdateManifest)> {
        let state = InstalledState::load(&self.config.state_path)?;
        let body = self.source.fetch_manifest(&self.config.manifest_url).await?;
        let manifest = UpdateManifest::from_json(&body, &self.config.executable_name)?;
        Ok((state, manifest))
    }

    fn fail(&self, observer: &dyn UpdateObserver, err: UpdaterError) -> UpdaterError {
        warn!(error = %err, "update run failed");
        observer.on_state_change(UpdateState::Failed, &err.to_string());
        err
    }
}
