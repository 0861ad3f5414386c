//! HTTPS manifest-based self-update mechanism with integrity verification.
//!
//! This crate lets the launcher discover a newer released version, stream
//! its artifacts to temporary storage, verify their SHA-256 digests, stage
//! them atomically over the live install, and restart into the new build.
//! Releases are described by a small JSON manifest that either names a
//! single downloadable file or an explicit list of them; version tokens are
//! compared as opaque identifiers so a republished older build installs
//! like any other update.
//!
//! ```ignore
//! use updater::{HttpSource, NoopObserver, UpdateConfig, UpdateCoordinator, UpdateOutcome};
//!
//! # async fn demo() -> updater::Result<()> {
//! let source = HttpSource::builder().build()?;
//! let config = UpdateConfig::new(
//!     "https://releases.example.com/latest.json",
//!     "/opt/launcher",
//!     "launcher",
//! );
//!
//! let coordinator = UpdateCoordinator::new(source, config);
//! match coordinator.run(&NoopObserver).await? {
//!     UpdateOutcome::Updated { version } => {
//!         println!("restarted into {version}");
//!         std::process::exit(0);
//!     }
//!     UpdateOutcome::UpToDate => println!("already at latest version"),
//!     UpdateOutcome::CheckFailed(err) => println!("check failed, continuing: {err}"),
//!     UpdateOutcome::AlreadyRunning => {}
//! }
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
mod install;
mod manifest;
mod relaunch;
mod source;
mod state;
mod transfer;
mod verify;
mod version;

pub use coordinator::{
    NoopObserver, UpdateConfig, UpdateCoordinator, UpdateObserver, UpdateOutcome, UpdateState,
};
pub use error::{Result, UpdaterError};
pub use install::{artifact_install_path, install};
pub use manifest::{ArtifactRef, UpdateManifest};
pub use relaunch::{relaunch, resolve_target, skip_requested, SKIP_UPDATE_FLAG};
pub use source::{HttpSource, HttpSourceBuilder, ProgressFn, UpdateSource};
pub use state::InstalledState;
pub use transfer::{download_all, StagedArtifact, TransferSession};
pub use verify::{digest_matches, file_sha256};
pub use version::needs_update;
