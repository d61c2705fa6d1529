/// Shared data types used across the bouncer crates.
///
/// Platform adapters produce these, the reconciliation loop consumes them and
/// the registry adapter builds snapshots out of them.
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BouncerError;

// ============================================================
// Identifiers
// ============================================================

/// Identity of a requester within the messaging platform (a Telegram user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub i64);

impl IdentityId {
    /// The raw platform identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = BouncerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(IdentityId)
            .map_err(|_| BouncerError::InvalidIdentity(s.to_string()))
    }
}

/// Identifier of a monitored group. Numeric chat ids and `@username` forms are
/// both accepted by the platform, so the value stays opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for GroupId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================
// Join Requests
// ============================================================

/// Key under which a join request is tracked while pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub group_id: GroupId,
    pub identity_id: IdentityId,
}

/// A request by an identity to join a monitored group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Target group.
    pub group_id: GroupId,
    /// Display name of the group, used in outbound messages.
    pub group_title: String,
    /// The requesting identity.
    pub identity_id: IdentityId,
    /// Update sequence number that produced this request. Only used for
    /// cursor bookkeeping, never for deduplication.
    pub source_update_id: i64,
}

impl JoinRequest {
    /// The (group, identity) pair identifying this request.
    pub fn key(&self) -> RequestKey {
        RequestKey {
            group_id: self.group_id.clone(),
            identity_id: self.identity_id,
        }
    }
}

/// One event from the platform's update stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    /// Monotonic sequence number assigned by the platform.
    pub update_id: i64,
    /// Present only for chat join request updates.
    pub join_request: Option<JoinRequest>,
}

/// Recipient of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    /// Post into a group chat.
    Group(GroupId),
    /// Direct message to an identity.
    Identity(IdentityId),
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTarget::Group(group) => write!(f, "group:{group}"),
            MessageTarget::Identity(identity) => write!(f, "identity:{identity}"),
        }
    }
}

// ============================================================
// Verified Identities
// ============================================================

/// The set of identities that are verified in the internal registry.
///
/// Rebuilt in full from the registry on every cycle; never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedIdentitySnapshot {
    identities: HashSet<IdentityId>,
}

impl VerifiedIdentitySnapshot {
    /// An empty snapshot (nobody verified).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw custom-field values.
    ///
    /// Each value holds one or more identity ids as text: a bare id, a JSON
    /// array, or a delimited list. Anything that is not an ASCII digit or `-`
    /// separates tokens; tokens that do not parse as an integer are skipped.
    pub fn from_field_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let identities = values
            .into_iter()
            .flat_map(|value| value.split(|c: char| !(c.is_ascii_digit() || c == '-')))
            .filter(|token| !token.is_empty())
            .filter_map(|token| token.parse::<i64>().ok())
            .map(IdentityId)
            .collect();
        Self { identities }
    }

    /// Whether the identity is verified.
    pub fn contains(&self, identity: IdentityId) -> bool {
        self.identities.contains(&identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl FromIterator<IdentityId> for VerifiedIdentitySnapshot {
    fn from_iter<T: IntoIterator<Item = IdentityId>>(iter: T) -> Self {
        Self {
            identities: iter.into_iter().collect(),
        }
    }
}
