//! Dead-Letter Publisher: re-publishes rejected votes to a side topic instead of dropping
//! them on the floor.

pub mod kafka;

use crate::model::Vote;
use async_trait::async_trait;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("transient publish failure: {0}")]
    Transient(String),
    #[error("fatal publish failure: {0}")]
    Fatal(String),
}

/// Publishes a vote that the Vote Processor rejected (duplicate or undecodable) to the
/// dead-letter topic, keyed by poll ID so a poll's rejects stay ordered relative to each other.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, vote: &Vote, reason: &str) -> PublishResult<()>;
}

pub mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakePublisher {
        pub published: Mutex<Vec<(Vote, String)>>,
    }

    impl FakePublisher {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl DeadLetterPublisher for FakePublisher {
        async fn publish(&self, vote: &Vote, reason: &str) -> PublishResult<()> {
            self.published
                .lock()
                .unwrap()
                .push((vote.clone(), reason.to_string()));
            Ok(())
        }
    }
}
