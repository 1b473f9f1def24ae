use super::producer::ProducerConfig;
use super::record::{Headers, Record};
use crate::config::{SaslConfig, TlsConfig};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{DeliveryResult, Header, Message, OwnedHeaders};
use rdkafka::producer::{BaseRecord, Producer as _, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::dispatcher::{self, Dispatch};
use tracing::{debug, error, info, warn};

/// Outcome of one submitted record, reported to its completion callback.
#[derive(Debug)]
pub struct Delivery {
    pub topic: String,
    /// Partition the record was written to, `-1` when unknown.
    pub partition: i32,
    /// Offset of the record, `-1` when it was not written.
    pub offset: i64,
    pub result: Result<()>,
}

/// Invoked exactly once per submitted record.
pub type DeliveryCallback = Box<dyn FnOnce(Delivery) + Send + Sync + 'static>;

/// The narrow surface of a Kafka client the producer depends on.
pub trait BrokerClient: Send + Sync + 'static {
    /// Enqueues `record` without waiting for the broker. `on_complete` runs
    /// once the broker acknowledged or the client gave up on the record,
    /// possibly on another thread.
    fn produce(&self, record: Record, on_complete: DeliveryCallback);

    /// Starts a cluster metadata refresh without waiting for it.
    fn refresh_metadata(&self);

    /// Succeeds when at least one discovered broker answers.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;

    /// Flushes outstanding records and releases the client.
    fn close(self) -> BoxFuture<'static, Result<()>>;
}

/// Routes librdkafka logs and delivery reports.
pub struct DeliveryContext {
    logger: Dispatch,
}

impl ClientContext for DeliveryContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        dispatcher::with_default(&self.logger, || match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => {
                error!(target: "kafka", facility = fac, "{}", log_message)
            }
            RDKafkaLogLevel::Warning => warn!(target: "kafka", facility = fac, "{}", log_message),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(target: "kafka", facility = fac, "{}", log_message)
            }
            RDKafkaLogLevel::Debug => debug!(target: "kafka", facility = fac, "{}", log_message),
        });
    }

    fn error(&self, error: KafkaError, reason: &str) {
        dispatcher::with_default(&self.logger, || {
            error!(target: "kafka", error = %error, "librdkafka: {}", reason)
        });
    }
}

/// Carried through librdkafka alongside each record.
pub struct PendingDelivery {
    on_complete: DeliveryCallback,
}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<PendingDelivery>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, delivery_opaque: Self::DeliveryOpaque) {
        let delivery = match delivery_result {
            Ok(message) => Delivery {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                result: Ok(()),
            },
            Err((err, message)) => Delivery {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                result: Err(Error::Kafka(err.clone())),
            },
        };
        (delivery_opaque.on_complete)(delivery);
    }
}

/// [`BrokerClient`] backed by an rdkafka [`ThreadedProducer`].
///
/// Delivery callbacks run on the producer's polling thread. Metadata
/// requests run on blocking threads; `close` waits for them before it
/// flushes and releases the native client.
pub struct KafkaClient {
    producer: Arc<ThreadedProducer<DeliveryContext>>,
    running: mpsc::Sender<()>,
    finished: mpsc::Receiver<()>,
    flush_timeout: Duration,
    probe_timeout: Duration,
}

/// Blocking work that uses the native client. Fields drop in declaration
/// order, so the client reference is gone before the job counts as finished.
struct BlockingJob {
    producer: Arc<ThreadedProducer<DeliveryContext>>,
    _running: mpsc::Sender<()>,
}

impl BlockingJob {
    fn fetch_metadata(self, timeout: Duration) -> rdkafka::error::KafkaResult<()> {
        self.producer.client().fetch_metadata(None, timeout).map(drop)
    }

    fn refresh_metadata(self, timeout: Duration) {
        let logger = self.producer.context().logger.clone();
        if let Err(e) = self.fetch_metadata(timeout) {
            dispatcher::with_default(&logger, || {
                warn!(error = %e, "Initial metadata refresh failed")
            });
        }
    }
}

impl KafkaClient {
    pub fn new<E>(cfg: &ProducerConfig<E>) -> Result<Self> {
        let logger = cfg
            .logger
            .clone()
            .unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));

        let producer: ThreadedProducer<DeliveryContext> = client_config(cfg)
            .create_with_context(DeliveryContext { logger })
            .map_err(Error::ClientCreation)?;
        forward_logs(&producer)?;

        let (running, finished) = mpsc::channel(1);
        Ok(Self {
            producer: Arc::new(producer),
            running,
            finished,
            flush_timeout: cfg.flush_timeout,
            probe_timeout: cfg.probe_timeout,
        })
    }

    fn job(&self) -> BlockingJob {
        BlockingJob {
            producer: Arc::clone(&self.producer),
            _running: self.running.clone(),
        }
    }

    fn logger(&self) -> &Dispatch {
        &self.producer.context().logger
    }
}

/// Routes librdkafka logs to the main queue, which the producer thread polls
/// and hands to [`DeliveryContext::log`]. Requires `log.queue=true`.
fn forward_logs(producer: &ThreadedProducer<DeliveryContext>) -> Result<()> {
    // SAFETY: the handle is owned by `producer` and outlives the call. A null
    // queue selects the main queue.
    let code = unsafe {
        rdkafka::bindings::rd_kafka_set_log_queue(
            producer.client().native_ptr(),
            std::ptr::null_mut(),
        )
    };
    match RDKafkaErrorCode::from(code) {
        RDKafkaErrorCode::NoError => Ok(()),
        code => Err(Error::ClientCreation(KafkaError::ClientCreation(format!(
            "failed routing client logs: {}",
            code
        )))),
    }
}

fn client_config<E>(cfg: &ProducerConfig<E>) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", cfg.brokers.join(","));

    if let Some(client_id) = &cfg.client_id {
        client.set("client.id", client_id);
        if let Some(version) = &cfg.version {
            client.set("client.software.name", client_id);
            client.set("client.software.version", version);
        }
    }

    // librdkafka takes a single codec; the first preference wins.
    if let Some(codec) = cfg.compression.first() {
        client.set("compression.type", codec.as_str());
    }

    let protocol = match (&cfg.tls, &cfg.sasl) {
        (Some(_), Some(_)) => "sasl_ssl",
        (Some(_), None) => "ssl",
        (None, Some(_)) => "sasl_plaintext",
        (None, None) => "plaintext",
    };
    client.set("security.protocol", protocol);

    if let Some(tls) = &cfg.tls {
        apply_tls(&mut client, tls);
    }
    if let Some(sasl) = &cfg.sasl {
        apply_sasl(&mut client, sasl);
    }

    client.set("log.queue", "true");
    client.set_log_level(RDKafkaLogLevel::Info);
    client
}

fn apply_tls(client: &mut ClientConfig, tls: &TlsConfig) {
    if let Some(ca) = &tls.ca_location {
        client.set("ssl.ca.location", ca.to_string_lossy());
    }
    if let Some(cert) = &tls.certificate_location {
        client.set("ssl.certificate.location", cert.to_string_lossy());
    }
    if let Some(key) = &tls.key_location {
        client.set("ssl.key.location", key.to_string_lossy());
    }
    if let Some(password) = &tls.key_password {
        client.set("ssl.key.password", password);
    }
    let algorithm = if tls.verify_hostname { "https" } else { "none" };
    client.set("ssl.endpoint.identification.algorithm", algorithm);
}

fn apply_sasl(client: &mut ClientConfig, sasl: &SaslConfig) {
    client.set("sasl.mechanism", sasl.mechanism.as_str());
    client.set("sasl.username", &sasl.username);
    client.set("sasl.password", &sasl.password);
}

fn owned_headers(headers: &Headers) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |owned, header| {
            owned.insert(Header {
                key: header.key.as_str(),
                value: Some(header.value.as_slice()),
            })
        })
}

impl BrokerClient for KafkaClient {
    fn produce(&self, record: Record, on_complete: DeliveryCallback) {
        let base = BaseRecord {
            topic: record.topic.as_str(),
            partition: record.partition,
            payload: Some(record.value.as_slice()),
            key: record.key.as_deref(),
            timestamp: record.timestamp,
            headers: Some(owned_headers(&record.headers)),
            delivery_opaque: Box::new(PendingDelivery { on_complete }),
        };

        // Enqueue failures (full queue, unknown partition) never reach the
        // delivery callback, so report them here.
        if let Err((err, base)) = self.producer.send(base) {
            (base.delivery_opaque.on_complete)(Delivery {
                topic: record.topic.clone(),
                partition: record.partition.unwrap_or(-1),
                offset: -1,
                result: Err(Error::Kafka(err)),
            });
        }
    }

    fn refresh_metadata(&self) {
        let job = self.job();
        let timeout = self.probe_timeout;
        let spawned = thread::Builder::new()
            .name("apm-queue-metadata".to_string())
            .spawn(move || job.refresh_metadata(timeout));

        if let Err(e) = spawned {
            dispatcher::with_default(self.logger(), || {
                warn!(error = %e, "Failed starting metadata refresh")
            });
        }
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        fetch_metadata(self.job(), self.probe_timeout).boxed()
    }

    fn close(self) -> BoxFuture<'static, Result<()>> {
        let KafkaClient {
            producer,
            running,
            mut finished,
            flush_timeout,
            ..
        } = self;

        async move {
            drop(running);
            // Every outstanding job holds a sender; recv yields None once all
            // of them have finished.
            finished.recv().await;
            flush(producer, flush_timeout).await
        }
        .boxed()
    }
}

async fn fetch_metadata(job: BlockingJob, timeout: Duration) -> Result<()> {
    tokio::task::spawn_blocking(move || job.fetch_metadata(timeout)).await??;
    Ok(())
}

/// Flushes and drops the last reference to the native client.
async fn flush(producer: Arc<ThreadedProducer<DeliveryContext>>, timeout: Duration) -> Result<()> {
    tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Compression, SaslMechanism};
    use crate::kafka::tests::LogBuffer;
    use std::time::Instant;

    fn create_test_config() -> ProducerConfig<()> {
        ProducerConfig {
            brokers: vec!["a:9092".to_string(), "b:9092".to_string()],
            ..Default::default()
        }
    }

    fn unreachable_config(logger: Dispatch) -> ProducerConfig<()> {
        ProducerConfig {
            brokers: vec!["127.0.0.1:1".to_string()],
            logger: Some(logger),
            probe_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[test]
    fn test_plaintext_defaults() {
        let client = client_config(&create_test_config());
        assert_eq!(client.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(client.get("security.protocol"), Some("plaintext"));
        assert_eq!(client.get("client.id"), None);
        assert_eq!(client.get("compression.type"), None);
    }

    #[test]
    fn test_identity_and_compression() {
        let cfg = ProducerConfig {
            client_id: Some("apm-server".to_string()),
            version: Some("8.0.0".to_string()),
            compression: vec![Compression::Zstd, Compression::Lz4],
            ..create_test_config()
        };
        let client = client_config(&cfg);
        assert_eq!(client.get("client.id"), Some("apm-server"));
        assert_eq!(client.get("client.software.name"), Some("apm-server"));
        assert_eq!(client.get("client.software.version"), Some("8.0.0"));
        assert_eq!(client.get("compression.type"), Some("zstd"));
    }

    #[test]
    fn test_version_without_client_id_is_ignored() {
        let cfg = ProducerConfig {
            version: Some("8.0.0".to_string()),
            ..create_test_config()
        };
        assert_eq!(client_config(&cfg).get("client.software.version"), None);
    }

    #[test]
    fn test_tls_and_sasl() {
        let cfg = ProducerConfig {
            tls: Some(TlsConfig {
                ca_location: Some("/etc/ssl/ca.pem".into()),
                verify_hostname: false,
                ..Default::default()
            }),
            sasl: Some(SaslConfig {
                mechanism: SaslMechanism::ScramSha256,
                username: "apm".to_string(),
                password: "secret".to_string(),
            }),
            ..create_test_config()
        };
        let client = client_config(&cfg);
        assert_eq!(client.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client.get("ssl.ca.location"), Some("/etc/ssl/ca.pem"));
        assert_eq!(client.get("ssl.endpoint.identification.algorithm"), Some("none"));
        assert_eq!(client.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
        assert_eq!(client.get("sasl.username"), Some("apm"));
    }

    #[test]
    fn test_owned_headers_keep_order() {
        use rdkafka::message::Headers as _;

        let headers: Headers = Arc::from(vec![
            super::super::RecordHeader { key: "a".to_string(), value: b"b".to_vec() },
            super::super::RecordHeader { key: "c".to_string(), value: b"d".to_vec() },
        ]);
        let owned = owned_headers(&headers);
        assert_eq!(owned.count(), 2);
        let first = owned.get(0);
        assert_eq!(first.key, "a");
        assert_eq!(first.value, Some(b"b".as_slice()));
    }

    #[test]
    fn test_client_logs_are_queued() {
        assert_eq!(client_config(&create_test_config()).get("log.queue"), Some("true"));
    }

    #[tokio::test]
    async fn test_client_logs_reach_configured_logger() {
        let logs = LogBuffer::default();
        let client = KafkaClient::new(&unreachable_config(logs.dispatch())).unwrap();
        client.refresh_metadata();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !logs.contents().contains(" kafka:") && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        client.close().await.unwrap();
        assert!(logs.contents().contains(" kafka:"), "{}", logs.contents());
    }

    #[test]
    fn test_refresh_without_runtime() {
        let logs = LogBuffer::default();
        let client = KafkaClient::new(&unreachable_config(logs.dispatch())).unwrap();
        client.refresh_metadata();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(client.close()).unwrap();

        assert!(logs.contents().contains("Initial metadata refresh failed"));
    }

    #[tokio::test]
    async fn test_close_releases_native_client() {
        let client = KafkaClient::new(&unreachable_config(Dispatch::none())).unwrap();
        let native = Arc::downgrade(&client.producer);

        client.refresh_metadata();
        // Abandon a probe while its metadata request is still running.
        let _ = tokio::time::timeout(Duration::from_millis(10), client.ping()).await;

        client.close().await.unwrap();
        assert!(native.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_failure_reaches_callback() {
        let client = KafkaClient::new(&unreachable_config(Dispatch::none())).unwrap();

        // Larger than the default message.max.bytes, rejected before queueing.
        let mut record = Record::new("topic-A", Arc::from(Vec::new()));
        record.value = vec![0; 2_000_000];

        let (tx, rx) = tokio::sync::oneshot::channel();
        client.produce(
            record,
            Box::new(move |delivery| {
                let _ = tx.send(delivery);
            }),
        );

        let delivery = rx.await.unwrap();
        assert_eq!(delivery.topic, "topic-A");
        assert_eq!(delivery.partition, -1);
        assert_eq!(delivery.offset, -1);
        assert!(matches!(delivery.result, Err(Error::Kafka(_))));

        client.close().await.unwrap();
    }
}
