//! Verified identity snapshot refresh with stale fallback.
//!
//! A failed registry query must not look like "nobody is verified", so the
//! last successfully loaded snapshot is reused whenever a refresh fails.

use std::sync::Arc;

use bouncer_types::errors::BouncerError;
use bouncer_types::traits::IdentityRegistry;
use bouncer_types::VerifiedIdentitySnapshot;

/// Where the snapshot used by a cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Freshly loaded from the registry this cycle.
    Fresh,
    /// The registry timed out; the previous snapshot was reused.
    StaleAfterTimeout,
    /// The registry failed; the previous snapshot was reused.
    StaleAfterError,
}

/// Refreshes the verified identity snapshot from an [`IdentityRegistry`].
pub struct SnapshotSource {
    registry: Arc<dyn IdentityRegistry>,
    last_known: VerifiedIdentitySnapshot,
}

impl SnapshotSource {
    pub fn new(registry: Arc<dyn IdentityRegistry>) -> Self {
        Self {
            registry,
            last_known: VerifiedIdentitySnapshot::empty(),
        }
    }

    /// Load a new snapshot, replacing the previous one in full.
    ///
    /// On failure the previous snapshot is returned unchanged. Before the
    /// first successful load that is the empty snapshot.
    pub async fn refresh(&mut self) -> (VerifiedIdentitySnapshot, SnapshotOrigin) {
        match self.registry.list_verified_identities().await {
            Ok(snapshot) => {
                self.last_known = snapshot.clone();
                (snapshot, SnapshotOrigin::Fresh)
            }
            Err(BouncerError::RegistryTimeout(ms)) => {
                tracing::warn!(
                    timeout_ms = ms,
                    reused = self.last_known.len(),
                    "identity registry timed out, reusing previous snapshot"
                );
                (self.last_known.clone(), SnapshotOrigin::StaleAfterTimeout)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    reused = self.last_known.len(),
                    "identity registry query failed, reusing previous snapshot"
                );
                (self.last_known.clone(), SnapshotOrigin::StaleAfterError)
            }
        }
    }
}
