//! Revoke an identity's membership across every monitored group.

use std::sync::Arc;

use serde::Serialize;

use bouncer_types::traits::PlatformClient;
use bouncer_types::{GroupId, IdentityId};

/// A group the identity could not be removed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    pub group_id: GroupId,
    pub error: String,
}

/// Per-group outcome of a revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationReport {
    pub identity_id: IdentityId,
    /// Groups the identity was removed from, in configuration order.
    pub removed: Vec<GroupId>,
    /// Groups where removal failed, in configuration order.
    pub failed: Vec<GroupFailure>,
}

impl RevocationReport {
    fn new(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            removed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Number of groups a removal was attempted in.
    pub fn attempted(&self) -> usize {
        self.removed.len() + self.failed.len()
    }
}

/// At least one removal failed. Carries the full report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "revoking identity {} failed in {} of {} groups",
    .report.identity_id,
    .report.failed.len(),
    .report.attempted()
)]
pub struct RevocationFailure {
    pub report: RevocationReport,
}

/// Removes an identity from every configured group.
///
/// Removal is an unban of a current member, which removes them without a
/// ban, so the identity can request to join again later.
pub struct RevocationHandler {
    platform: Arc<dyn PlatformClient>,
    groups: Vec<GroupId>,
}

impl RevocationHandler {
    pub fn new(platform: Arc<dyn PlatformClient>, groups: Vec<GroupId>) -> Self {
        Self { platform, groups }
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Remove `identity` from each group in order.
    ///
    /// Best effort: a failing group does not stop the remaining ones. Succeeds
    /// only when every removal succeeded; an empty group list succeeds
    /// trivially.
    pub async fn revoke(&self, identity: IdentityId) -> Result<RevocationReport, RevocationFailure> {
        let mut report = RevocationReport::new(identity);

        for group in &self.groups {
            match self.platform.remove_member(group, identity).await {
                Ok(()) => {
                    tracing::info!(group_id = %group, identity_id = %identity, "removed member");
                    report.removed.push(group.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        group_id = %group,
                        identity_id = %identity,
                        error = %e,
                        "removing member failed"
                    );
                    report.failed.push(GroupFailure {
                        group_id: group.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(RevocationFailure { report })
        }
    }
}
