//! Pending join request queue.
//!
//! Holds every join request that has been observed but not yet resolved,
//! in the order it was first observed. At most one entry exists per
//! (group, identity) pair.

use std::collections::HashSet;

use bouncer_types::{JoinRequest, RequestKey};

/// How far a pending request has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Observed, but the requester has not been sent the informational message.
    AwaitingNotice,
    /// The requester was told how to verify; no further messages until verified.
    Notified,
    /// The request was approved; only the welcome message is outstanding.
    Approved,
}

/// A join request together with its resolution progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub request: JoinRequest,
    pub stage: Stage,
    /// Approvals the platform rejected so far.
    pub approve_attempts: u32,
    /// Failed welcome deliveries since the request was approved.
    pub welcome_attempts: u32,
}

impl PendingEntry {
    fn new(request: JoinRequest) -> Self {
        Self {
            request,
            stage: Stage::AwaitingNotice,
            approve_attempts: 0,
            welcome_attempts: 0,
        }
    }

    pub fn key(&self) -> RequestKey {
        self.request.key()
    }
}

/// Insertion-ordered queue of unresolved join requests.
#[derive(Debug, Default)]
pub struct PendingRequestQueue {
    entries: Vec<PendingEntry>,
    keys: HashSet<RequestKey>,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request unless one for the same (group, identity) is pending.
    ///
    /// Returns `true` if the request was added.
    pub fn add_if_absent(&mut self, request: JoinRequest) -> bool {
        if !self.keys.insert(request.key()) {
            return false;
        }
        self.entries.push(PendingEntry::new(request));
        true
    }

    /// Remove the entry for `key`. Returns `true` if it was present.
    pub fn remove(&mut self, key: &RequestKey) -> bool {
        if !self.keys.remove(key) {
            return false;
        }
        self.entries.retain(|entry| entry.key() != *key);
        true
    }

    /// Remove every entry whose key is in `keys` in a single compaction pass.
    ///
    /// Returns the number of entries removed.
    pub fn remove_all(&mut self, keys: &[RequestKey]) -> usize {
        let doomed: HashSet<&RequestKey> = keys.iter().filter(|k| self.keys.contains(k)).collect();
        if doomed.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| !doomed.contains(&entry.key()));
        for key in doomed {
            self.keys.remove(key);
        }
        before - self.entries.len()
    }

    /// A snapshot of the pending entries in insertion order.
    ///
    /// The snapshot is detached from the queue: mutating the queue while
    /// walking it neither skips nor repeats entries.
    pub fn iterate(&self) -> Vec<PendingEntry> {
        self.entries.clone()
    }

    pub fn get(&self, key: &RequestKey) -> Option<&PendingEntry> {
        self.entries.iter().find(|entry| entry.key() == *key)
    }

    /// Apply `update` to the entry for `key`. Returns `false` if absent.
    pub fn update<F>(&mut self, key: &RequestKey, update: F) -> bool
    where
        F: FnOnce(&mut PendingEntry),
    {
        match self.entries.iter_mut().find(|entry| entry.key() == *key) {
            Some(entry) => {
                update(entry);
                true
            }
            None => false,
        }
    }

    /// Move the entry for `key` to `stage`. Returns `false` if absent.
    pub fn set_stage(&mut self, key: &RequestKey, stage: Stage) -> bool {
        self.update(key, |entry| entry.stage = stage)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bouncer_types::{GroupId, IdentityId};

    fn request(group: &str, identity: i64, update_id: i64) -> JoinRequest {
        JoinRequest {
            group_id: GroupId::from(group),
            group_title: format!("Group {group}"),
            identity_id: IdentityId(identity),
            source_update_id: update_id,
        }
    }

    #[test]
    fn test_add_if_absent_deduplicates_pairs() {
        let mut queue = PendingRequestQueue::new();
        assert!(queue.add_if_absent(request("-1", 1, 10)));
        assert!(!queue.add_if_absent(request("-1", 1, 11)));
        assert!(queue.add_if_absent(request("-2", 1, 12)));
        assert!(queue.add_if_absent(request("-1", 2, 13)));
        assert_eq!(queue.len(), 3);

        // The first observation is kept.
        let kept = queue.get(&request("-1", 1, 0).key()).unwrap();
        assert_eq!(kept.request.source_update_id, 10);
        assert_eq!(kept.stage, Stage::AwaitingNotice);
    }

    #[test]
    fn test_iterate_preserves_insertion_order() {
        let mut queue = PendingRequestQueue::new();
        for (i, identity) in [5, 3, 9].into_iter().enumerate() {
            queue.add_if_absent(request("-1", identity, i as i64));
        }
        let order: Vec<i64> = queue
            .iterate()
            .iter()
            .map(|e| e.request.identity_id.get())
            .collect();
        assert_eq!(order, vec![5, 3, 9]);
    }

    #[test]
    fn test_removal_during_iteration_visits_every_entry_once() {
        let mut queue = PendingRequestQueue::new();
        for identity in 1..=6 {
            queue.add_if_absent(request("-1", identity, identity));
        }

        let mut visited = Vec::new();
        for entry in queue.iterate() {
            visited.push(entry.request.identity_id.get());
            // Remove every even identity as soon as it is seen.
            if entry.request.identity_id.get() % 2 == 0 {
                assert!(queue.remove(&entry.key()));
            }
        }

        assert_eq!(visited, vec![1, 2, 3, 4, 5, 6]);
        let left: Vec<i64> = queue
            .iterate()
            .iter()
            .map(|e| e.request.identity_id.get())
            .collect();
        assert_eq!(left, vec![1, 3, 5]);
    }

    #[test]
    fn test_remove_all_compacts_once() {
        let mut queue = PendingRequestQueue::new();
        for identity in 1..=4 {
            queue.add_if_absent(request("-1", identity, identity));
        }
        let keys = vec![
            request("-1", 2, 0).key(),
            request("-1", 4, 0).key(),
            request("-1", 99, 0).key(),
        ];
        assert_eq!(queue.remove_all(&keys), 2);
        assert_eq!(queue.len(), 2);
        assert!(!queue.contains(&request("-1", 2, 0).key()));

        // A removed pair can be queued again.
        assert!(queue.add_if_absent(request("-1", 2, 50)));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut queue = PendingRequestQueue::new();
        queue.add_if_absent(request("-1", 1, 1));
        assert!(!queue.remove(&request("-1", 2, 0).key()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_set_stage_and_update() {
        let mut queue = PendingRequestQueue::new();
        let req = request("-1", 1, 1);
        queue.add_if_absent(req.clone());

        assert!(queue.set_stage(&req.key(), Stage::Notified));
        assert_eq!(queue.get(&req.key()).unwrap().stage, Stage::Notified);

        assert!(queue.update(&req.key(), |entry| {
            entry.stage = Stage::Approved;
            entry.welcome_attempts = 2;
        }));
        let entry = queue.get(&req.key()).unwrap();
        assert_eq!((entry.stage, entry.welcome_attempts), (Stage::Approved, 2));

        assert!(!queue.set_stage(&request("-9", 9, 0).key(), Stage::Notified));
    }
}
