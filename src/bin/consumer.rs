use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vote_consumer::config::Config;
use vote_consumer::deadletter::kafka::KafkaDeadLetterPublisher;
use vote_consumer::hub::server::{router, AppState};
use vote_consumer::hub::Hub;
use vote_consumer::ingest::kafka::KafkaVoteConsumer;
use vote_consumer::metrics::ProcessorMetrics;
use vote_consumer::processing::VoteProcessor;
use vote_consumer::store::redis_store::RedisStore;
use vote_consumer::store::VoteStore;

#[derive(Parser)]
#[command(about = "Consumes votes off the ingress log, tallies them, and serves live results")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let level = cli.log_level.unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "consumer exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(RedisStore::connect(&config.redis.url).await?);
    let publisher = Arc::new(KafkaDeadLetterPublisher::new(
        &config.kafka.brokers,
        config.kafka.dead_letter_topic.clone(),
    )?);
    let consumer = KafkaVoteConsumer::new(
        &config.kafka.brokers,
        &config.kafka.consumer_group,
        &config.kafka.votes_topic,
    )?;
    let hub = Hub::spawn();
    let metrics = Arc::new(ProcessorMetrics::new());

    let worker_count = config
        .processing
        .worker_count
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));

    let cancel = CancellationToken::new();

    let app_state = AppState {
        hub: hub.clone(),
        store: store.clone(),
        metrics: metrics.clone(),
    };
    let listener = tokio::net::TcpListener::bind(config.hub.bind_addr).await?;
    info!(addr = %config.hub.bind_addr, "hub listening");
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(app_state))
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let processor = VoteProcessor::new(consumer, store.clone(), publisher, hub, metrics, worker_count);
    let processor_cancel = cancel.clone();
    let mut processor_handle = tokio::spawn(processor.run(processor_cancel));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        result = &mut processor_handle => {
            if let Err(e) = result {
                error!(error = %e, "processor task panicked");
            } else {
                info!("processor stopped on its own");
            }
        }
    }

    cancel.cancel();
    let _ = processor_handle.await;
    let _ = server.await;
    store.close().await?;
    Ok(())
}
