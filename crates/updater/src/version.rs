//! Version comparison policy.
//!
//! Version tokens are opaque identifiers, not semantic versions: the
//! manifest is the sole authority for what "current" means, and a manifest
//! that points at an older build must win so that operators can roll a
//! release back by republishing it. Plain inequality is therefore the
//! intended policy, not a placeholder for ordered comparison.

/// Decide whether the manifest's `latest` version requires an update of the
/// locally `installed` one.
///
/// An empty or whitespace-only `latest` fails closed: an incomplete manifest
/// must never trigger an install. A missing installed record means any
/// usable `latest` wins.
pub fn needs_update(installed: Option<&str>, latest: &str) -> bool {
    let latest = latest.trim();
    if latest.is_empty() {
        return false;
    }
    match installed {
        Some(current) => current != latest,
        None => true,
    }
}
