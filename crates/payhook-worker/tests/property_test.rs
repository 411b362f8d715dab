//! Property-based tests for the idempotency store and admission queue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use payhook_core::{EventId, Job};
use payhook_worker::{AdmissionQueue, Claim, IdempotencyStore, QueueError};
use proptest::prelude::*;

proptest! {
    #[test]
    fn committed_count_matches_distinct_ids(ids in prop::collection::vec("[a-z0-9-]{1,12}", 0..64)) {
        let store = IdempotencyStore::new();
        for id in &ids {
            store.commit(&EventId::from(id.as_str()));
        }

        let distinct: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(store.len(), distinct.len());
        for id in &ids {
            prop_assert_eq!(store.try_claim(&EventId::from(id.as_str())), Claim::Committed);
        }
    }

    #[test]
    fn release_never_removes_commits(ids in prop::collection::vec("[a-z]{1,6}", 1..32)) {
        let store = IdempotencyStore::new();
        for id in &ids {
            let id = EventId::from(id.as_str());
            store.commit(&id);
            store.release(&id);
            prop_assert!(store.contains(&id));
        }
    }

    #[test]
    fn queue_never_exceeds_capacity(capacity in 1usize..32, offered in 0usize..64) {
        let queue = AdmissionQueue::new(capacity);
        let mut accepted = 0;

        for i in 0..offered {
            match queue.enqueue(Job::new(i.to_string())) {
                Ok(()) => accepted += 1,
                Err(QueueError::CapacityExceeded { .. }) => {},
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        prop_assert_eq!(accepted, offered.min(capacity));
        prop_assert_eq!(queue.len(), accepted);
    }
}

#[test]
fn concurrent_claims_have_exactly_one_winner() {
    for round in 0..20 {
        let store = Arc::new(IdempotencyStore::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let id = EventId::new(format!("race-{round}"));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let winners = winners.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    if store.try_claim(&id).is_claimed() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
