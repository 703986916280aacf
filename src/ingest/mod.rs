//! Vote ingestion: the boundary between the ingress log topic and the Vote Processor's internal
//! job channel.
//!
//! Decoding happens one layer up, in the processor, because a frame that fails to decode still
//! has to be dead-lettered and committed — the consumer itself never inspects the payload.

pub mod kafka;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("transient ingest failure: {0}")]
    Transient(String),
    #[error("fatal ingest failure: {0}")]
    Fatal(String),
}

/// Opaque position marker used to commit progress back to the source topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub partition: i32,
    pub offset: i64,
}

/// A raw frame off the ingress log, not yet decoded.
pub struct Frame {
    pub payload: Vec<u8>,
    pub offset: Offset,
}

/// Pulls frames off the ingress log. `next` returns `Ok(None)` only when the source is
/// exhausted (never the case for a live topic).
#[async_trait::async_trait]
pub trait VoteConsumer: Send {
    async fn next(&mut self) -> IngestResult<Option<Frame>>;

    /// Mark a frame's offset as processed. Called after the Vote Processor has durably recorded
    /// the outcome (accepted, duplicate, or dropped as undecodable) — never before, and never for
    /// a store error, so the broker redelivers that frame.
    async fn commit(&mut self, offset: &Offset) -> IngestResult<()>;
}

pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    pub struct FakeConsumer {
        frames: VecDeque<Vec<u8>>,
        committed: Vec<Offset>,
        next_offset: i64,
    }

    impl FakeConsumer {
        pub fn new(frames: Vec<Vec<u8>>) -> Self {
            Self {
                frames: frames.into(),
                committed: Vec::new(),
                next_offset: 0,
            }
        }

        pub fn committed(&self) -> &[Offset] {
            &self.committed
        }
    }

    #[async_trait::async_trait]
    impl VoteConsumer for FakeConsumer {
        async fn next(&mut self) -> IngestResult<Option<Frame>> {
            let Some(payload) = self.frames.pop_front() else {
                return Ok(None);
            };
            let offset = Offset {
                partition: 0,
                offset: self.next_offset,
            };
            self.next_offset += 1;
            Ok(Some(Frame { payload, offset }))
        }

        async fn commit(&mut self, offset: &Offset) -> IngestResult<()> {
            self.committed.push(offset.clone());
            Ok(())
        }
    }
}
