//! Join request reconciliation loop.
//!
//! One cycle:
//! 1. Refresh the verified identity snapshot (stale fallback on failure)
//! 2. Pull new updates from the platform and advance the cursor
//! 3. Merge newly observed join requests into the pending queue
//! 4. Evaluate every pending request: approve and welcome verified
//!    requesters, send one informational message to new unverified ones
//! 5. Compact resolved requests out of the queue
//!
//! The reconciler owns the cursor and the queue. Platform failures only
//! affect the request they happened on; it stays queued and is retried next
//! cycle, up to a limit for rejections the platform keeps repeating. Nothing
//! in a cycle is fatal.

use std::sync::Arc;
use std::time::Duration;

use bouncer_types::config::{BouncerConfig, MessageTemplates};
use bouncer_types::errors::BouncerError;
use bouncer_types::template::TemplateParams;
use bouncer_types::traits::{IdentityRegistry, PlatformClient};
use bouncer_types::{JoinRequest, MessageTarget, VerifiedIdentitySnapshot};

use crate::cursor::Cursor;
use crate::queue::{PendingEntry, PendingRequestQueue, Stage};
use crate::snapshot::{SnapshotOrigin, SnapshotSource};

/// Default long-poll timeout for fetching updates.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of failed welcome deliveries tolerated after approval.
const DEFAULT_MAX_WELCOME_ATTEMPTS: u32 = 5;

/// Default number of approvals the platform may reject before giving up.
const DEFAULT_MAX_APPROVE_ATTEMPTS: u32 = 5;

/// Rejections meaning the join request can never be approved: it was
/// declined, withdrawn or already handled, or the requester is a member.
const SETTLED_REJECTIONS: &[&str] = &["HIDE_REQUESTER_MISSING", "USER_ALREADY_PARTICIPANT"];

/// Tunables for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Long-poll timeout passed to `fetch_updates`.
    pub poll_timeout: Duration,
    /// Failed welcome deliveries after which an approved request is dropped.
    pub max_welcome_attempts: u32,
    /// Approvals rejected by the platform after which a request is dropped.
    /// Transport failures do not count.
    pub max_approve_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_welcome_attempts: DEFAULT_MAX_WELCOME_ATTEMPTS,
            max_approve_attempts: DEFAULT_MAX_APPROVE_ATTEMPTS,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_config(config: &BouncerConfig) -> Self {
        Self {
            poll_timeout: config.telegram.poll_timeout(),
            max_welcome_attempts: config.schedule.max_welcome_attempts,
            max_approve_attempts: config.schedule.max_approve_attempts,
        }
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Where the verified identity snapshot came from.
    pub snapshot: SnapshotOrigin,
    /// Verified identities in the snapshot used.
    pub verified: usize,
    /// Updates returned by the platform.
    pub updates: usize,
    /// Join requests newly added to the queue.
    pub new_requests: usize,
    /// Requests approved.
    pub approved: usize,
    /// Welcome messages delivered.
    pub welcomed: usize,
    /// Informational messages delivered.
    pub notified: usize,
    /// Requests dropped without completing: the platform refused approval
    /// for good, or the welcome message could not be delivered.
    pub dropped: usize,
    /// Platform calls that failed.
    pub failures: usize,
    /// Requests still pending after the cycle.
    pub pending: usize,
    /// Cursor position after the cycle.
    pub next_offset: i64,
}

impl CycleReport {
    fn new(snapshot: SnapshotOrigin, verified: usize) -> Self {
        Self {
            snapshot,
            verified,
            updates: 0,
            new_requests: 0,
            approved: 0,
            welcomed: 0,
            notified: 0,
            dropped: 0,
            failures: 0,
            pending: 0,
            next_offset: 0,
        }
    }
}

/// What to do with a queue entry after evaluating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// Leave the entry as it is.
    Keep,
    /// The informational message was delivered.
    Notified,
    /// The platform rejected the approval; retry later.
    ApprovalRejected { attempts: u32 },
    /// Approved, but the welcome message is still outstanding.
    WelcomePending { attempts: u32 },
    /// Take the entry out of the queue.
    Remove,
}

/// Drives reconciliation cycles and owns their state.
pub struct Reconciler {
    platform: Arc<dyn PlatformClient>,
    snapshots: SnapshotSource,
    templates: MessageTemplates,
    cursor: Cursor,
    queue: PendingRequestQueue,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler with an empty queue and a cursor at offset 0.
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        registry: Arc<dyn IdentityRegistry>,
        templates: MessageTemplates,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            platform,
            snapshots: SnapshotSource::new(registry),
            templates,
            cursor: Cursor::new(),
            queue: PendingRequestQueue::new(),
            config,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn queue(&self) -> &PendingRequestQueue {
        &self.queue
    }

    /// Run one reconciliation cycle.
    ///
    /// Never fails: every error is logged and only affects the request it
    /// happened on.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let (snapshot, origin) = self.snapshots.refresh().await;
        let mut report = CycleReport::new(origin, snapshot.len());

        let observed = self.pull(&mut report).await;
        for request in observed {
            let (group_id, identity_id) = (request.group_id.clone(), request.identity_id);
            if self.queue.add_if_absent(request) {
                report.new_requests += 1;
                tracing::debug!(%group_id, %identity_id, "queued join request");
            } else {
                tracing::debug!(%group_id, %identity_id, "join request already pending");
            }
        }

        self.evaluate(&snapshot, &mut report).await;

        report.pending = self.queue.len();
        report.next_offset = self.cursor.next_offset();
        tracing::info!(
            snapshot = ?report.snapshot,
            verified = report.verified,
            updates = report.updates,
            new_requests = report.new_requests,
            approved = report.approved,
            welcomed = report.welcomed,
            notified = report.notified,
            dropped = report.dropped,
            failures = report.failures,
            pending = report.pending,
            next_offset = report.next_offset,
            "reconciliation cycle finished"
        );
        report
    }

    /// Fetch updates, advance the cursor past each one and return the join
    /// requests they carried. A failed fetch yields nothing.
    async fn pull(&mut self, report: &mut CycleReport) -> Vec<JoinRequest> {
        let offset = self.cursor.next_offset();
        let updates = match self
            .platform
            .fetch_updates(offset, self.config.poll_timeout)
            .await
        {
            Ok(updates) => updates,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(offset, error = %e, "fetching updates failed");
                return Vec::new();
            }
        };

        report.updates = updates.len();
        updates
            .into_iter()
            .filter_map(|update| {
                self.cursor.observe(update.update_id);
                update.join_request
            })
            .collect()
    }

    /// Evaluate every pending entry, then apply removals in one pass.
    async fn evaluate(&mut self, snapshot: &VerifiedIdentitySnapshot, report: &mut CycleReport) {
        let mut resolved = Vec::new();

        for entry in self.queue.iterate() {
            match self.resolve(&entry, snapshot, report).await {
                Resolution::Keep => {}
                Resolution::Notified => {
                    self.queue.set_stage(&entry.key(), Stage::Notified);
                }
                Resolution::ApprovalRejected { attempts } => {
                    self.queue
                        .update(&entry.key(), |e| e.approve_attempts = attempts);
                }
                Resolution::WelcomePending { attempts } => {
                    self.queue.update(&entry.key(), |e| {
                        e.stage = Stage::Approved;
                        e.welcome_attempts = attempts;
                    });
                }
                Resolution::Remove => resolved.push(entry.key()),
            }
        }

        self.queue.remove_all(&resolved);
    }

    async fn resolve(
        &self,
        entry: &PendingEntry,
        snapshot: &VerifiedIdentitySnapshot,
        report: &mut CycleReport,
    ) -> Resolution {
        let request = &entry.request;

        if entry.stage == Stage::Approved {
            return self.deliver_welcome(entry, report).await;
        }

        if snapshot.contains(request.identity_id) {
            if let Err(e) = self
                .platform
                .approve_join_request(&request.group_id, request.identity_id)
                .await
            {
                report.failures += 1;
                return self.approval_failed(entry, e, report);
            }
            report.approved += 1;
            tracing::info!(
                group_id = %request.group_id,
                identity_id = %request.identity_id,
                "approved join request from verified identity"
            );
            return self.deliver_welcome(entry, report).await;
        }

        if entry.stage != Stage::AwaitingNotice {
            return Resolution::Keep;
        }

        let text = self.templates.info.render(&self.params(request));
        match self
            .platform
            .send_message(&MessageTarget::Identity(request.identity_id), &text)
            .await
        {
            Ok(()) => {
                report.notified += 1;
                tracing::info!(
                    group_id = %request.group_id,
                    identity_id = %request.identity_id,
                    "sent verification info to unverified requester"
                );
                Resolution::Notified
            }
            Err(e) => {
                report.failures += 1;
                tracing::warn!(
                    group_id = %request.group_id,
                    identity_id = %request.identity_id,
                    error = %e,
                    "sending verification info failed, will retry"
                );
                Resolution::Keep
            }
        }
    }

    /// Decide what to do after the platform refused an approval.
    ///
    /// Transport failures are retried indefinitely. API rejections are
    /// retried up to `max_approve_attempts`, except those that say the
    /// request is already settled, which drop the entry at once.
    fn approval_failed(
        &self,
        entry: &PendingEntry,
        err: BouncerError,
        report: &mut CycleReport,
    ) -> Resolution {
        let request = &entry.request;

        let description = match &err {
            BouncerError::Api { description, .. } => description,
            _ => {
                tracing::warn!(
                    group_id = %request.group_id,
                    identity_id = %request.identity_id,
                    error = %err,
                    "approving join request failed, will retry"
                );
                return Resolution::Keep;
            }
        };

        if SETTLED_REJECTIONS.iter().any(|code| description.contains(code)) {
            report.dropped += 1;
            tracing::warn!(
                group_id = %request.group_id,
                identity_id = %request.identity_id,
                error = %err,
                "join request is no longer pending, dropping it"
            );
            return Resolution::Remove;
        }

        let attempts = entry.approve_attempts + 1;
        if attempts >= self.config.max_approve_attempts {
            report.dropped += 1;
            tracing::warn!(
                group_id = %request.group_id,
                identity_id = %request.identity_id,
                attempts,
                error = %err,
                "giving up on join request the platform keeps rejecting"
            );
            return Resolution::Remove;
        }

        tracing::warn!(
            group_id = %request.group_id,
            identity_id = %request.identity_id,
            attempts,
            error = %err,
            "platform rejected approval, will retry"
        );
        Resolution::ApprovalRejected { attempts }
    }

    /// Send the welcome message for an approved request.
    async fn deliver_welcome(&self, entry: &PendingEntry, report: &mut CycleReport) -> Resolution {
        let request = &entry.request;
        let text = self.templates.welcome.render(&self.params(request));

        match self
            .platform
            .send_message(&MessageTarget::Identity(request.identity_id), &text)
            .await
        {
            Ok(()) => {
                report.welcomed += 1;
                Resolution::Remove
            }
            Err(e) => {
                report.failures += 1;
                let attempts = entry.welcome_attempts + 1;
                if attempts >= self.config.max_welcome_attempts {
                    report.dropped += 1;
                    tracing::warn!(
                        group_id = %request.group_id,
                        identity_id = %request.identity_id,
                        attempts,
                        error = %e,
                        "giving up on welcome message for approved request"
                    );
                    Resolution::Remove
                } else {
                    tracing::warn!(
                        group_id = %request.group_id,
                        identity_id = %request.identity_id,
                        attempts,
                        error = %e,
                        "sending welcome message failed, will retry"
                    );
                    Resolution::WelcomePending { attempts }
                }
            }
        }
    }

    fn params<'a>(&'a self, request: &'a JoinRequest) -> TemplateParams<'a> {
        TemplateParams {
            title: &request.group_title,
            help: &self.templates.help_url,
            rules: &self.templates.rules_url,
        }
    }
}
