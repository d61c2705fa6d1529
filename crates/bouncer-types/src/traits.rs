/// Trait contracts at the seams of the bouncer system.
///
/// The reconciliation loop and the revocation handler code against these
/// interfaces, never against a concrete platform or database. Tests swap in
/// mocks; the daemon wires the Telegram and PostgreSQL adapters.
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::BouncerError;
use crate::models::*;

// ============================================================
// Messaging Platform
// ============================================================

/// Authenticated calls to the group-messaging platform.
///
/// Pure transport: implementations hold no reconciliation state. Every call
/// either succeeds or fails with [`BouncerError::Transport`] (network or
/// timeout) or [`BouncerError::Api`] (the platform rejected the call).
/// Callers retry failed actions on a later cycle, so implementations must be
/// safe to call again with the same arguments.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Long-poll for updates with sequence numbers `>= offset`.
    ///
    /// Never blocks much longer than `timeout`.
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<UpdateEvent>, BouncerError>;

    /// Approve a pending request to join a group.
    async fn approve_join_request(
        &self,
        group: &GroupId,
        identity: IdentityId,
    ) -> Result<(), BouncerError>;

    /// Remove a member from a group while leaving them free to rejoin.
    ///
    /// This is not a ban: revocation must not lock the identity out
    /// permanently.
    async fn remove_member(&self, group: &GroupId, identity: IdentityId)
        -> Result<(), BouncerError>;

    /// Send an already-rendered rich-text message.
    async fn send_message(&self, target: &MessageTarget, text: &str) -> Result<(), BouncerError>;
}

// ============================================================
// Identity Registry
// ============================================================

/// Read-only source of the identities verified in the internal system.
///
/// Implementations must read from a consistent, read-only view and bound the
/// query in time, reporting [`BouncerError::RegistryTimeout`] when the bound
/// is exceeded and [`BouncerError::Registry`] for anything else.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Load the full current set of verified identities.
    async fn list_verified_identities(&self) -> Result<VerifiedIdentitySnapshot, BouncerError>;
}
