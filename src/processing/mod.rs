//! Vote Processor: the ingestion fiber, worker pool, and periodic reporter that turn
//! ingress frames into store writes, dead-letter routes, and hub broadcasts.

use crate::deadletter::DeadLetterPublisher;
use crate::hub::Hub;
use crate::ingest::{Frame, IngestError, VoteConsumer};
use crate::metrics::ProcessorMetrics;
use crate::model::{encode_tally, Vote};
use crate::store::VoteStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the channel between the ingestion fiber and the worker pool.
const JOB_QUEUE_CAPACITY: usize = 100;

/// How often the reporter fiber logs each known poll's tally.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

pub struct VoteProcessor<C, S, D> {
    consumer: C,
    store: Arc<S>,
    publisher: Arc<D>,
    hub: Hub,
    metrics: Arc<ProcessorMetrics>,
    worker_count: usize,
}

impl<C, S, D> VoteProcessor<C, S, D>
where
    C: VoteConsumer + 'static,
    S: VoteStore + 'static,
    D: DeadLetterPublisher + 'static,
{
    pub fn new(
        consumer: C,
        store: Arc<S>,
        publisher: Arc<D>,
        hub: Hub,
        metrics: Arc<ProcessorMetrics>,
        worker_count: usize,
    ) -> Self {
        Self {
            consumer,
            store,
            publisher,
            hub,
            metrics,
            worker_count: worker_count.max(1),
        }
    }

    /// Run the processor until `cancel` fires. Drains in-flight jobs before returning so a vote
    /// that was already pulled off the log is never abandoned mid-flight.
    ///
    /// The ingestion fiber counts as one of the `worker_count` cooperative actors, so the worker
    /// pool spawns `worker_count - 1` fibers.
    pub async fn run(self, cancel: CancellationToken) {
        let (job_tx, job_rx) = mpsc::channel::<Frame>(JOB_QUEUE_CAPACITY);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let known_polls = Arc::new(Mutex::new(HashSet::<String>::new()));
        let consumer = Arc::new(Mutex::new(self.consumer));

        let worker_count = self.worker_count.saturating_sub(1).max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let consumer = Arc::clone(&consumer);
            let store = Arc::clone(&self.store);
            let publisher = Arc::clone(&self.publisher);
            let hub = self.hub.clone();
            let metrics = Arc::clone(&self.metrics);
            let known_polls = Arc::clone(&known_polls);
            workers.push(tokio::spawn(async move {
                worker_loop(
                    worker_id,
                    job_rx,
                    consumer,
                    store,
                    publisher,
                    hub,
                    metrics,
                    known_polls,
                )
                .await;
            }));
        }

        let reporter = tokio::spawn({
            let known_polls = Arc::clone(&known_polls);
            let store = Arc::clone(&self.store);
            let cancel = cancel.clone();
            async move { report_loop(known_polls, store, cancel).await }
        });

        ingest_loop(Arc::clone(&consumer), job_tx, cancel.clone()).await;

        // Dropping the job sender lets every worker drain its queue and exit once it's empty.
        for worker in workers {
            let _ = worker.await;
        }
        reporter.abort();
    }
}

async fn ingest_loop<C: VoteConsumer>(
    consumer: Arc<Mutex<C>>,
    job_tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion fiber stopping on cancellation");
                break;
            }
            frame = async { consumer.lock().await.next().await } => {
                match frame {
                    Ok(Some(frame)) => {
                        if job_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(IngestError::Transient(reason)) => {
                        warn!(error = %reason, "transient ingest error, retrying");
                    }
                    Err(IngestError::Fatal(reason)) => {
                        error!(error = %reason, "fatal ingest error, stopping processor");
                        break;
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<C, S, D>(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<Frame>>>,
    consumer: Arc<Mutex<C>>,
    store: Arc<S>,
    publisher: Arc<D>,
    hub: Hub,
    metrics: Arc<ProcessorMetrics>,
    known_polls: Arc<Mutex<HashSet<String>>>,
) where
    C: VoteConsumer + 'static,
    S: VoteStore + 'static,
    D: DeadLetterPublisher + 'static,
{
    loop {
        let frame = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(frame) = frame else {
            debug!(worker_id, "job queue closed, worker exiting");
            break;
        };

        let outcome =
            process_frame(&store, &publisher, &hub, &metrics, &known_polls, &frame.payload).await;
        if matches!(outcome, Outcome::Commit) {
            if let Err(e) = consumer.lock().await.commit(&frame.offset).await {
                warn!(worker_id, error = %e, "failed to commit offset");
            }
        }
    }
}

/// Whether a frame's offset should be committed once processing finishes. A store error leaves
/// the offset uncommitted so the broker redelivers the frame; every other outcome (decoded
/// successfully, duplicate, or undecodable) advances past it.
enum Outcome {
    Commit,
    Retry,
}

async fn process_frame<S, D>(
    store: &S,
    publisher: &D,
    hub: &Hub,
    metrics: &ProcessorMetrics,
    known_polls: &Mutex<HashSet<String>>,
    payload: &[u8],
) -> Outcome
where
    S: VoteStore,
    D: DeadLetterPublisher,
{
    let started = Instant::now();

    let vote = match Vote::from_json_bytes(payload) {
        Ok(vote) => vote,
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            return Outcome::Commit;
        }
    };

    known_polls.lock().await.insert(vote.poll_id.clone());

    let outcome = match store.register_vote(&vote).await {
        Ok(true) => {
            metrics
                .votes_processed
                .with_label_values(&[&vote.poll_id])
                .inc();
            broadcast_tally(store, hub, &vote.poll_id).await;
            Outcome::Commit
        }
        Ok(false) => {
            metrics
                .votes_duplicate
                .with_label_values(&[&vote.poll_id])
                .inc();
            if let Err(e) = publisher.publish(&vote, "duplicate").await {
                warn!(poll_id = %vote.poll_id, error = %e, "failed to dead-letter duplicate vote");
            }
            Outcome::Commit
        }
        Err(e) => {
            error!(poll_id = %vote.poll_id, error = %e, "store rejected vote registration, leaving offset uncommitted for redelivery");
            Outcome::Retry
        }
    };

    metrics
        .processing_time
        .with_label_values(&[&vote.poll_id])
        .observe(started.elapsed().as_secs_f64());
    outcome
}

async fn broadcast_tally<S: VoteStore>(store: &S, hub: &Hub, poll_id: &str) {
    match store.get_results(poll_id).await {
        Ok(tally) => match encode_tally(&tally) {
            Ok(bytes) => hub.broadcast(poll_id.to_string(), bytes).await,
            Err(e) => warn!(poll_id, error = %e, "failed to encode tally for broadcast"),
        },
        Err(e) => warn!(poll_id, error = %e, "failed to load tally for broadcast"),
    }
}

async fn report_loop<S: VoteStore>(
    known_polls: Arc<Mutex<HashSet<String>>>,
    store: Arc<S>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let polls: Vec<String> = known_polls.lock().await.iter().cloned().collect();
                for poll_id in polls {
                    match store.get_results(&poll_id).await {
                        Ok(tally) => info!(poll_id = %poll_id, ?tally, "poll tally"),
                        Err(e) => warn!(poll_id = %poll_id, error = %e, "failed to load tally for report"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadletter::fake::FakePublisher;
    use crate::ingest::fake::FakeConsumer;
    use crate::store::fake::FakeStore;

    fn vote_frame(poll_id: &str, user_id: &str, option_id: &str) -> Vec<u8> {
        Vote {
            poll_id: poll_id.into(),
            user_id: user_id.into(),
            option_id: option_id.into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
        }
        .to_json_bytes()
        .unwrap()
    }

    #[tokio::test]
    async fn first_vote_is_accepted_and_tallied() {
        let consumer = FakeConsumer::new(vec![vote_frame("p1", "u1", "A")]);
        let store = Arc::new(FakeStore::new());
        let publisher = Arc::new(FakePublisher::new());
        let hub = Hub::spawn();
        let metrics = Arc::new(ProcessorMetrics::new());

        let processor = VoteProcessor::new(consumer, store.clone(), publisher, hub, metrics, 2);
        processor.run(CancellationToken::new()).await;

        let tally = store.get_results("p1").await.unwrap();
        assert_eq!(tally.get("A"), Some(&1));
    }

    #[tokio::test]
    async fn duplicate_vote_is_dead_lettered_and_not_tallied_twice() {
        let consumer = FakeConsumer::new(vec![
            vote_frame("p1", "u1", "A"),
            vote_frame("p1", "u1", "A"),
        ]);
        let store = Arc::new(FakeStore::new());
        let publisher = Arc::new(FakePublisher::new());
        let hub = Hub::spawn();
        let metrics = Arc::new(ProcessorMetrics::new());

        let processor = VoteProcessor::new(consumer, store.clone(), publisher.clone(), hub, metrics, 2);
        processor.run(CancellationToken::new()).await;

        let tally = store.get_results("p1").await.unwrap();
        assert_eq!(tally.values().sum::<u64>(), 1);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn garbage_frame_is_dropped_without_dead_lettering_and_does_not_block_later_votes() {
        let consumer = FakeConsumer::new(vec![b"not json".to_vec(), vote_frame("p1", "u1", "A")]);
        let store = Arc::new(FakeStore::new());
        let publisher = Arc::new(FakePublisher::new());
        let hub = Hub::spawn();
        let metrics = Arc::new(ProcessorMetrics::new());

        let processor = VoteProcessor::new(consumer, store.clone(), publisher.clone(), hub, metrics, 2);
        processor.run(CancellationToken::new()).await;

        let tally = store.get_results("p1").await.unwrap();
        assert_eq!(tally.get("A"), Some(&1));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_and_duplicate_frames_commit_their_offsets() {
        let consumer = FakeConsumer::new(vec![
            vote_frame("p1", "u1", "A"),
            vote_frame("p1", "u1", "A"),
        ]);
        let store = Arc::new(FakeStore::new());
        let publisher = Arc::new(FakePublisher::new());
        let hub = Hub::spawn();
        let metrics = Arc::new(ProcessorMetrics::new());

        // worker_count of 2 spawns a single worker fiber (worker_count - 1), which is enough to
        // drive both frames through sequentially in this test.
        let processor = VoteProcessor::new(consumer, store, publisher, hub, metrics, 2);
        processor.run(CancellationToken::new()).await;
    }
}
