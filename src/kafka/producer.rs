use super::client::{BrokerClient, Delivery, KafkaClient};
use super::mutator::RecordMutator;
use super::record::{headers_from_context, Headers, Record};
use super::serializer::Encoder;
use super::topic::TopicRouter;
use crate::config::{Compression, KafkaSettings, SaslConfig, TlsConfig};
use crate::error::ConfigErrors;
use crate::queuecontext::QueueContext;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::dispatcher::{self, Dispatch};
use tracing::{debug, error, info};

/// Configuration for publishing events of type `E` to Kafka.
pub struct ProducerConfig<E> {
    /// `host:port` addresses of the brokers to bootstrap from.
    pub brokers: Vec<String>,
    /// Client identity reported to the brokers.
    pub client_id: Option<String>,
    /// Software version reported with `client_id`; ignored without one.
    pub version: Option<String>,
    /// Receives delivery failures, lifecycle events and client logs.
    pub logger: Option<Dispatch>,
    pub encoder: Option<Arc<dyn Encoder<E>>>,
    /// When set, `process_batch` waits until every record of the batch was
    /// acknowledged or failed.
    pub sync: bool,
    pub topic_router: Option<Arc<dyn TopicRouter<E>>>,
    /// Applied in order to every record. An error aborts the batch.
    pub mutators: Vec<Arc<dyn RecordMutator<E>>>,
    pub tls: Option<TlsConfig>,
    pub sasl: Option<SaslConfig>,
    pub compression: Vec<Compression>,
    /// Upper bound for flushing outstanding records on close.
    pub flush_timeout: Duration,
    /// Upper bound for metadata requests issued by health probes.
    pub probe_timeout: Duration,
}

impl<E> Default for ProducerConfig<E> {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            client_id: None,
            version: None,
            logger: None,
            encoder: None,
            sync: false,
            topic_router: None,
            mutators: Vec::new(),
            tls: None,
            sasl: None,
            compression: Vec::new(),
            flush_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl<E> ProducerConfig<E> {
    /// Copies the file-backed settings. Logger, encoder, router and
    /// mutators still have to be supplied.
    pub fn from_settings(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings.brokers.clone(),
            client_id: settings.client_id.clone(),
            version: settings.version.clone(),
            sync: settings.sync,
            tls: settings.tls.clone(),
            sasl: settings.sasl.clone(),
            compression: settings.compression.clone(),
            flush_timeout: settings.flush_timeout(),
            probe_timeout: settings.probe_timeout(),
            ..Self::default()
        }
    }

    /// Checks every required field and reports all violations at once.
    pub fn validate(&self) -> std::result::Result<(), ConfigErrors> {
        let mut errors = ConfigErrors::default();
        if self.brokers.is_empty() {
            errors.push("brokers cannot be empty");
        }
        if self.logger.is_none() {
            errors.push("logger must be set");
        }
        if self.encoder.is_none() {
            errors.push("encoder must be set");
        }
        if self.topic_router.is_none() {
            errors.push("topic router must be set");
        }
        errors.into_result()
    }

    fn into_pipeline(self) -> std::result::Result<Pipeline<E>, ConfigErrors> {
        let validation = self.validate();
        match (validation, self.logger, self.encoder, self.topic_router) {
            (Ok(()), Some(logger), Some(encoder), Some(topic_router)) => Ok(Pipeline {
                logger,
                encoder,
                topic_router,
                mutators: self.mutators,
                sync: self.sync,
            }),
            (validation, ..) => Err(validation.err().unwrap_or_default()),
        }
    }
}

/// The validated, per-record half of a [`ProducerConfig`].
struct Pipeline<E> {
    logger: Dispatch,
    encoder: Arc<dyn Encoder<E>>,
    topic_router: Arc<dyn TopicRouter<E>>,
    mutators: Vec<Arc<dyn RecordMutator<E>>>,
    sync: bool,
}

/// Publishes batches of events to Kafka, one record per event.
///
/// Any number of `process_batch` calls may run concurrently. `close` waits
/// for them to finish and blocks new ones before releasing the client.
pub struct Producer<E, C = KafkaClient> {
    pipeline: Pipeline<E>,
    client: RwLock<Option<C>>,
}

impl<E> Producer<E, KafkaClient> {
    /// Validates `cfg` and connects a [`KafkaClient`].
    ///
    /// No client is created when validation fails.
    pub fn new(cfg: ProducerConfig<E>) -> Result<Self> {
        cfg.validate()?;
        let client = KafkaClient::new(&cfg)?;
        Self::with_client(cfg, client)
    }
}

impl<E, C: BrokerClient> Producer<E, C> {
    /// Builds a producer over an already constructed client.
    pub fn with_client(cfg: ProducerConfig<E>, client: C) -> Result<Self> {
        let pipeline = cfg.into_pipeline()?;

        // Warm up cluster metadata so the first batch and health probe do
        // not pay for discovery.
        client.refresh_metadata();

        Ok(Self {
            pipeline,
            client: RwLock::new(Some(client)),
        })
    }

    /// Publishes every event of `batch` as its own record.
    ///
    /// Headers are built once from the metadata carried by `ctx` and shared
    /// by all records of the batch. A failing mutator or encoder stops the
    /// batch and its error is returned; records already submitted for
    /// earlier events are not withdrawn. Publish failures reported by the
    /// broker are logged and never returned.
    ///
    /// In sync mode the call returns once every submitted record has been
    /// acknowledged or failed. Dropping the future stops the wait but does
    /// not cancel records already handed to the client.
    pub async fn process_batch(&self, ctx: &QueueContext, batch: &[E]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Hold read access so close cannot release the client mid-batch.
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(Error::Closed)?;

        let headers = headers_from_context(ctx);
        let (done, mut pending) = mpsc::channel::<()>(1);

        for (index, event) in batch.iter().enumerate() {
            let topic = self.pipeline.topic_router.route(event);
            let mut record = Record::new(topic, Arc::clone(&headers));

            for mutator in &self.pipeline.mutators {
                mutator
                    .mutate(event, &mut record)
                    .map_err(|source| Error::Mutator { index, source })?;
            }

            record.value = self
                .pipeline
                .encoder
                .encode(event)
                .map_err(|source| Error::Encode { index, source })?;

            let completion = done.clone();
            let logger = self.pipeline.logger.clone();
            let headers = Arc::clone(&headers);
            client.produce(
                record,
                Box::new(move |delivery| {
                    log_delivery(&logger, &headers, delivery);
                    drop(completion);
                }),
            );
        }

        if self.pipeline.sync {
            drop(done);
            // Every callback holds a sender; recv yields None once all of
            // them have been dropped.
            pending.recv().await;
        }

        Ok(())
    }

    /// Returns an error when no discovered broker answers a metadata
    /// request.
    pub async fn healthy(&self) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(Error::Closed)?;
        client
            .ping()
            .await
            .map_err(|e| Error::HealthProbe(Box::new(e)))
    }

    /// Flushes outstanding records and releases the client.
    ///
    /// Waits for in-flight batches. Closing an already closed producer is a
    /// no-op; any later `process_batch` or `healthy` call fails with
    /// [`Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.client.write().await;
        let Some(client) = guard.take() else {
            dispatcher::with_default(&self.pipeline.logger, || {
                debug!("Producer already closed")
            });
            return Ok(());
        };

        let result = client.close().await;
        dispatcher::with_default(&self.pipeline.logger, || match &result {
            Ok(()) => info!("Producer closed"),
            Err(e) => error!(error = %e, "Failed flushing producer on close"),
        });
        result
    }
}

fn log_delivery(logger: &Dispatch, headers: &Headers, delivery: Delivery) {
    if let Err(e) = &delivery.result {
        dispatcher::with_default(logger, || {
            error!(
                error = %e,
                topic = %delivery.topic,
                offset = delivery.offset,
                partition = delivery.partition,
                headers = ?headers,
                "failed producing message"
            )
        });
    }
}
