//! In-memory idempotency store keyed by event identifier.
//!
//! An identifier is first claimed (in flight), then either committed once the
//! job reaches a terminal outcome or released if the failure could not be
//! classified. Claiming is a single atomic insert-if-absent, so concurrent
//! duplicate deliveries cannot both proceed to processing. Committed entries
//! are never removed for the life of the process.

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::warn;

use payhook_core::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InFlight,
    Committed,
}

/// Result of attempting to claim an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Caller now owns the identifier and should process it.
    Claimed,
    /// Another job is currently processing the identifier.
    InFlight,
    /// Identifier already reached a terminal outcome.
    Committed,
}

impl Claim {
    /// Whether the caller acquired the claim.
    pub fn is_claimed(self) -> bool {
        self == Self::Claimed
    }
}

/// Concurrent set of claimed and committed event identifiers.
#[derive(Debug, Default)]
pub struct IdempotencyStore {
    entries: DashMap<EventId, EntryState>,
}

impl IdempotencyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `id` if no entry exists for it.
    pub fn try_claim(&self, id: &EventId) -> Claim {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                EntryState::InFlight => Claim::InFlight,
                EntryState::Committed => Claim::Committed,
            },
            Entry::Vacant(entry) => {
                entry.insert(EntryState::InFlight);
                Claim::Claimed
            },
        }
    }

    /// Marks `id` as needing no further work.
    ///
    /// Returns `true` if this call performed the transition and `false` if
    /// the identifier was already committed. Committing an unclaimed
    /// identifier is allowed.
    pub fn commit(&self, id: &EventId) -> bool {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() == EntryState::Committed {
                    return false;
                }
                entry.insert(EntryState::Committed);
                true
            },
            Entry::Vacant(entry) => {
                entry.insert(EntryState::Committed);
                true
            },
        }
    }

    /// Drops an in-flight claim so a later delivery is treated as new work.
    ///
    /// Committed entries are left in place. Returns `true` if a claim was
    /// released.
    pub fn release(&self, id: &EventId) -> bool {
        let removed =
            self.entries.remove_if(id, |_, state| *state == EntryState::InFlight).is_some();

        if !removed && self.contains(id) {
            warn!(event_id = %id, "refusing to release committed idempotency entry");
        }
        removed
    }

    /// Whether `id` has been committed.
    pub fn contains(&self, id: &EventId) -> bool {
        self.entries.get(id).is_some_and(|state| *state == EntryState::Committed)
    }

    /// Whether `id` is claimed and not yet committed.
    pub fn is_in_flight(&self, id: &EventId) -> bool {
        self.entries.get(id).is_some_and(|state| *state == EntryState::InFlight)
    }

    /// Number of committed identifiers.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| *entry.value() == EntryState::Committed).count()
    }

    /// Whether no identifiers have been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of identifiers currently claimed and in flight.
    pub fn in_flight(&self) -> usize {
        self.entries.iter().filter(|entry| *entry.value() == EntryState::InFlight).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> EventId {
        EventId::from(value)
    }

    #[test]
    fn claim_then_commit() {
        let store = IdempotencyStore::new();

        assert_eq!(store.try_claim(&id("a")), Claim::Claimed);
        assert!(store.is_in_flight(&id("a")));
        assert!(!store.contains(&id("a")));
        assert_eq!(store.try_claim(&id("a")), Claim::InFlight);

        assert!(store.commit(&id("a")));
        assert!(store.contains(&id("a")));
        assert_eq!(store.try_claim(&id("a")), Claim::Committed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commit_happens_at_most_once() {
        let store = IdempotencyStore::new();
        assert!(store.commit(&id("a")));
        assert!(!store.commit(&id("a")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn release_frees_claim_but_never_a_commit() {
        let store = IdempotencyStore::new();

        store.try_claim(&id("a"));
        assert!(store.release(&id("a")));
        assert_eq!(store.try_claim(&id("a")), Claim::Claimed);

        store.commit(&id("b"));
        assert!(!store.release(&id("b")));
        assert!(store.contains(&id("b")));
    }

    #[test]
    fn counts_only_committed_entries() {
        let store = IdempotencyStore::new();
        store.try_claim(&id("in-flight"));
        store.commit(&id("done"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.in_flight(), 1);
        assert!(!store.is_empty());
    }
}
