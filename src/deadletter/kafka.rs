//! Kafka-backed `DeadLetterPublisher`.
//!
//! Producer tuning mirrors the original pipeline's dead-letter path: acks from the full ISR,
//! five retries, a short linger so rejects batch without adding real latency, and Snappy on the
//! wire. Records are keyed by poll ID so a poll's dead letters keep their relative order.

use super::{DeadLetterPublisher, PublishError, PublishResult};
use crate::model::Vote;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaDeadLetterPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetterPublisher {
    pub fn new(brokers: &[String], topic: impl Into<String>) -> PublishResult<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("acks", "all")
            .set("retries", "5")
            .set("linger.ms", "10")
            .set("compression.type", "snappy")
            .create()
            .map_err(|e| PublishError::Fatal(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }
}

#[async_trait]
impl DeadLetterPublisher for KafkaDeadLetterPublisher {
    async fn publish(&self, vote: &Vote, reason: &str) -> PublishResult<()> {
        let payload = vote
            .to_json_bytes()
            .map_err(|e| PublishError::Fatal(format!("could not encode vote: {e}")))?;

        let record = FutureRecord::to(&self.topic)
            .key(&vote.poll_id)
            .payload(&payload)
            .headers(rdkafka::message::OwnedHeaders::new().insert(rdkafka::message::Header {
                key: "reason",
                value: Some(reason),
            }));

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(err, _owned_message)| classify(err))?;
        Ok(())
    }
}

/// `QueueFull` means the producer's local buffer is saturated; the caller can retry once it
/// drains. Everything else (auth, serialization, unknown topic) won't resolve on retry.
fn classify(err: KafkaError) -> PublishError {
    match err {
        KafkaError::MessageProduction(rdkafka::error::RDKafkaErrorCode::QueueFull) => {
            PublishError::Transient(err.to_string())
        }
        other => PublishError::Fatal(other.to_string()),
    }
}
