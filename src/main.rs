use anyhow::{bail, Context as _};
use apm_queue::kafka::{JsonEncoder, KeyStrategy, Producer, ProducerConfig, StaticRouter, Timestamp};
use apm_queue::{Config, QueueContext, RecordMutator};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "apm-queue")]
#[command(about = "Publish batches of JSON events to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read newline-delimited JSON events from stdin and publish them
    Publish {
        #[arg(short, long)]
        topic: String,

        #[arg(long, help = "Wait for every record of a batch to be acknowledged")]
        sync: bool,

        #[arg(long, default_value_t = 500)]
        batch_size: usize,

        #[arg(long, default_value_t = 100)]
        linger_ms: u64,

        #[arg(short, long = "metadata", value_name = "KEY=VALUE", value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,

        #[arg(long, value_name = "PATH", help = "Dot-separated event field used as record key")]
        key_field: Option<String>,
    },
    /// Probe the brokers and exit non-zero when none answers
    Health,
}

fn parse_metadata(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_client_id = ?config.kafka.client_id,
        kafka_compression = ?config.kafka.compression,
        "Configuration summary"
    );

    match args.command {
        Command::Publish {
            topic,
            sync,
            batch_size,
            linger_ms,
            metadata,
            key_field,
        } => {
            let mut mutators: Vec<Arc<dyn RecordMutator<Value>>> = vec![Arc::new(Timestamp)];
            if let Some(path) = key_field {
                mutators.push(Arc::new(KeyStrategy::FieldPath(path)));
            }

            let cfg = ProducerConfig {
                logger: Some(tracing::dispatcher::get_default(tracing::Dispatch::clone)),
                encoder: Some(Arc::new(JsonEncoder::default())),
                topic_router: Some(Arc::new(StaticRouter::new(topic))),
                mutators,
                sync: sync || config.kafka.sync,
                ..ProducerConfig::from_settings(&config.kafka)
            };
            let producer = Producer::new(cfg)?;

            let ctx = if metadata.is_empty() {
                QueueContext::background()
            } else {
                QueueContext::background().with_metadata(metadata.into_iter().collect::<HashMap<_, _>>())
            };

            let published = publish(&producer, &ctx, batch_size, Duration::from_millis(linger_ms)).await;
            let closed = producer.close().await;
            publish_outcome(published, closed)
        }
        Command::Health => {
            let cfg = ProducerConfig::<Value> {
                logger: Some(tracing::dispatcher::get_default(tracing::Dispatch::clone)),
                encoder: Some(Arc::new(JsonEncoder::default())),
                topic_router: Some(Arc::new(StaticRouter::new("health"))),
                ..ProducerConfig::from_settings(&config.kafka)
            };
            let producer = Producer::new(cfg)?;
            let result = producer.healthy().await;
            producer.close().await?;
            match result {
                Ok(()) => {
                    info!("Kafka is reachable");
                    Ok(())
                }
                Err(e) => bail!(e),
            }
        }
    }
}

async fn publish(
    producer: &Producer<Value>,
    ctx: &QueueContext,
    batch_size: usize,
    linger: Duration,
) -> anyhow::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let lines = LinesStream::new(stdin.lines()).chunks_timeout(batch_size.max(1), linger);
    tokio::pin!(lines);

    let mut published = 0usize;
    while let Some(chunk) = lines.next().await {
        let mut batch = Vec::with_capacity(chunk.len());
        for line in chunk {
            let line = line.context("failed reading stdin")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(event) => batch.push(event),
                Err(e) => warn!(error = %e, "Skipping malformed event"),
            }
        }

        if let Err(e) = producer.process_batch(ctx, &batch).await {
            error!(error = %e, "Batch aborted");
            return Err(e.into());
        }
        published += batch.len();
    }

    info!(events = published, "Finished publishing");
    Ok(())
}

/// A failed batch takes precedence over a failed close.
fn publish_outcome(published: anyhow::Result<()>, closed: apm_queue::Result<()>) -> anyhow::Result<()> {
    published?;
    closed?;
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("apm_queue=debug,kafka=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apm_queue=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
