//! Kafka-backed `VoteConsumer`.
//!
//! Joins the configured consumer group at the earliest offset, matching the original pipeline's
//! replay-from-start behavior so a restarted consumer re-derives its tallies from the full log
//! rather than skipping whatever arrived while it was down.

use super::{Frame, IngestError, IngestResult, Offset, VoteConsumer};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;

pub struct KafkaVoteConsumer {
    consumer: StreamConsumer,
}

impl KafkaVoteConsumer {
    pub fn new(brokers: &[String], group_id: &str, topic: &str) -> IngestResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| IngestError::Fatal(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| IngestError::Fatal(e.to_string()))?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl VoteConsumer for KafkaVoteConsumer {
    async fn next(&mut self) -> IngestResult<Option<Frame>> {
        match self.consumer.recv().await {
            Ok(message) => {
                let payload = message.payload().unwrap_or_default().to_vec();
                let offset = Offset {
                    partition: message.partition(),
                    offset: message.offset(),
                };
                Ok(Some(Frame { payload, offset }))
            }
            Err(KafkaError::MessageConsumption(code)) => {
                Err(IngestError::Transient(code.to_string()))
            }
            Err(other) => Err(IngestError::Fatal(other.to_string())),
        }
    }

    async fn commit(&mut self, offset: &Offset) -> IngestResult<()> {
        let mut assignment = rdkafka::TopicPartitionList::new();
        let topic = self
            .consumer
            .subscription()
            .map_err(|e| IngestError::Fatal(e.to_string()))?
            .elements()
            .first()
            .map(|e| e.topic().to_string())
            .ok_or_else(|| IngestError::Fatal("no active subscription".to_string()))?;
        assignment
            .add_partition_offset(
                &topic,
                offset.partition,
                rdkafka::Offset::Offset(offset.offset + 1),
            )
            .map_err(|e| IngestError::Fatal(e.to_string()))?;
        self.consumer
            .commit(&assignment, CommitMode::Async)
            .map_err(|e| IngestError::Fatal(e.to_string()))
    }
}
