//! Store Adapter: a thin, typed facade over the external key-value store.
//!
//! The contract is exactly two operations. Everything about atomicity, key naming, and the
//! register-and-tally invariant lives behind this trait so the Vote Processor never talks to
//! Redis directly.

pub mod redis_store;

use crate::model::{Tally, Vote};
use async_trait::async_trait;

/// Result type for Store Adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// Facade over the external key-value store.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Atomically add `vote.user_id` to the poll's voter set and, only if that add was new,
    /// increment `vote.option_id`'s tally. Returns whether the voter was new.
    async fn register_vote(&self, vote: &Vote) -> StoreResult<bool>;

    /// Snapshot read of a poll's tally. Empty if the poll has no entries yet.
    async fn get_results(&self, poll_id: &str) -> StoreResult<Tally>;

    /// Release connection resources. Idempotent.
    async fn close(&self) -> StoreResult<()>;
}

pub mod fake {
    //! In-memory `VoteStore` test double, mirroring this codebase's existing hand-written mock
    //! pattern (a fake behind the trait, not a mocking-framework proxy).

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        voters: HashMap<String, HashSet<String>>,
        tallies: HashMap<String, Tally>,
    }

    /// Faithfully reproduces the atomic-script contract: the tally only moves when the
    /// voter is new.
    #[derive(Default)]
    pub struct FakeStore {
        state: Mutex<State>,
    }

    impl FakeStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl VoteStore for FakeStore {
        async fn register_vote(&self, vote: &Vote) -> StoreResult<bool> {
            let mut state = self.state.lock().unwrap();
            let voters = state.voters.entry(vote.poll_id.clone()).or_default();
            let is_new = voters.insert(vote.user_id.clone());
            if is_new {
                let tally = state.tallies.entry(vote.poll_id.clone()).or_default();
                *tally.entry(vote.option_id.clone()).or_insert(0) += 1;
            }
            Ok(is_new)
        }

        async fn get_results(&self, poll_id: &str) -> StoreResult<Tally> {
            let state = self.state.lock().unwrap();
            Ok(state.tallies.get(poll_id).cloned().unwrap_or_default())
        }

        async fn close(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_registration_of_same_voter_is_not_new() {
        let store = FakeStore::new();
        let vote = Vote {
            poll_id: "p1".into(),
            user_id: "u1".into(),
            option_id: "A".into(),
            timestamp: "t".into(),
        };
        assert!(store.register_vote(&vote).await.unwrap());
        assert!(!store.register_vote(&vote).await.unwrap());

        let tally = store.get_results("p1").await.unwrap();
        assert_eq!(tally.get("A"), Some(&1));
    }

    #[tokio::test]
    async fn count_matches_voter_count_after_duplicates() {
        let store = FakeStore::new();
        for user in ["u1", "u1", "u2", "u1"] {
            let vote = Vote {
                poll_id: "p1".into(),
                user_id: user.into(),
                option_id: "A".into(),
                timestamp: "t".into(),
            };
            store.register_vote(&vote).await.unwrap();
        }
        let tally = store.get_results("p1").await.unwrap();
        let sum: u64 = tally.values().sum();
        assert_eq!(sum, 2);
    }
}
