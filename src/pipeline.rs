//! Pipeline orchestration and execution.
//!
//! A pipeline wires a [`WorkSource`] into a [`Producer`], the producer into a
//! [`Broadcaster`], and each broadcast stream into one [`Consumer`]. Every
//! stage runs as its own task and they talk only through bounded channels.
//!
//! A run moves from idle to running, then either drains (input exhausted,
//! in-flight items finish) or cancels (the token fires and undelivered
//! results are dropped), and is done once every consumer has returned. A
//! pipeline is consumed by [`Pipeline::run`] and cannot be restarted.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::broadcast::Broadcaster;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::ratelimit::RateLimiter;
use crate::traits::{Consumer, Fetcher, WorkSource};
use crate::types::{PairResult, WorkItem};
use crate::util::{cancel_after, CancellableExt};

/// A single-use run of source, producer, broadcaster and consumers.
pub struct Pipeline<S> {
    source: S,
    producer: Producer,
    token: CancellationToken,
    consumers: Vec<Box<dyn Consumer + Send>>,
    duration: Duration,
    buffer_size: usize,
}

impl<S> Pipeline<S>
where
    S: WorkSource + Send + 'static,
{
    /// Create a new pipeline.
    ///
    /// `token` is the only cancellation mechanism. Cancelling it, or letting
    /// the configured duration elapse, stops every stage.
    pub fn new(source: S, producer: Producer, token: CancellationToken) -> Self {
        Self {
            source,
            producer,
            token,
            consumers: Vec::new(),
            duration: Duration::ZERO,
            buffer_size: 1,
        }
    }

    /// Build a pipeline from a validated configuration
    pub fn from_config(
        config: &PipelineConfig,
        source: S,
        fetcher: Arc<dyn Fetcher>,
        token: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limit)?);
        let producer = Producer::new(fetcher, limiter)
            .concurrency(config.concurrency)
            .headers(config.headers.clone())
            .buffer_size(config.buffer_size);

        Ok(Self::new(source, producer, token)
            .duration(config.duration)
            .buffer_size(config.buffer_size))
    }

    /// Register a consumer. Each consumer gets its own broadcast stream.
    pub fn consumer<C>(mut self, consumer: C) -> Self
    where
        C: Consumer + Send + 'static,
    {
        self.consumers.push(Box::new(consumer));
        self
    }

    /// Cancel the run after `duration`; zero means unbounded
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the capacity of the work stream and of each consumer stream
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Run until every consumer has seen its stream close.
    ///
    /// Returns `Ok(())` both when the input drained and when the run was
    /// cancelled; check the token to tell them apart. Returns `Err` for an
    /// invalid configuration (before anything starts) or, after all
    /// consumers have returned, for the first consumer that failed.
    pub async fn run(self) -> Result<()> {
        let Pipeline {
            source,
            producer,
            token,
            consumers,
            duration,
            buffer_size,
        } = self;

        if consumers.is_empty() {
            return Err(Error::configuration("at least one consumer is required"));
        }
        if buffer_size == 0 {
            return Err(Error::configuration("buffer size must be at least 1"));
        }
        producer.validate()?;

        // stage tasks stop with the caller's token, and are torn down when the run ends
        let stages = token.child_token();
        let timer = cancel_after(&token, duration);

        let (work_tx, work_rx) = mpsc::channel(buffer_size);
        tokio::spawn(run_source(source, work_tx, stages.clone()));

        let results = producer.produce(work_rx, stages.clone())?;
        let (streams, _relay) = Broadcaster::new(consumers.len(), stages.clone())
            .buffer_size(buffer_size)
            .spawn(results)?;

        debug!(consumers = consumers.len(), ?duration, "pipeline started");

        let mut tasks = JoinSet::new();
        for (id, (consumer, stream)) in consumers.into_iter().zip(streams).enumerate() {
            tasks.spawn(run_consumer(id, consumer, stream));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(Error::from).and_then(|r| r);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        stages.cancel();
        if let Some(timer) = timer {
            timer.abort();
        }

        debug!(cancelled = token.is_cancelled(), "pipeline finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn run_source<S>(mut source: S, tx: mpsc::Sender<WorkItem>, token: CancellationToken)
where
    S: WorkSource + Send,
{
    let mut read = 0usize;

    loop {
        let item = match source.next_item().cancellable(&token).await {
            Ok(Ok(Some(item))) => item,
            Ok(Ok(None)) => {
                debug!(read, "work source exhausted");
                break;
            }
            Ok(Err(e)) => {
                debug!(error = %e, read, "work source failed, ending input");
                break;
            }
            Err(_) => {
                trace!(read, "cancelled while reading work");
                break;
            }
        };

        match tx.send(item).cancellable(&token).await {
            Ok(Ok(())) => read += 1,
            _ => break,
        }
    }
}

async fn run_consumer(
    id: usize,
    mut consumer: Box<dyn Consumer + Send>,
    mut stream: mpsc::Receiver<PairResult>,
) -> Result<()> {
    let mut consumed = 0usize;

    while let Some(item) = stream.recv().await {
        if let Err(e) = consumer.consume(item).await {
            debug!(consumer = id, error = %e, "consumer failed, detaching");
            return Err(e);
        }
        consumed += 1;
    }

    trace!(consumer = id, consumed, "consumer stream closed");
    consumer.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::CountConsumer;
    use crate::sources::VecSource;
    use crate::types::{Response, Target};
    use crate::util::{consumer_from_fn, fetcher_from_fn};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    /// Records the level of every event emitted under a `pairfetch` target
    struct LevelRecorder(Arc<std::sync::Mutex<Vec<tracing::Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let meta = event.metadata();
            if meta.target().starts_with("pairfetch") {
                self.0.lock().unwrap().push(*meta.level());
            }
        }
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl WorkSource for BrokenSource {
        async fn next_item(&mut self) -> Result<Option<WorkItem>> {
            Err(Error::custom("unreadable"))
        }
    }

    fn fetcher() -> Arc<dyn Fetcher> {
        Arc::new(fetcher_from_fn(|_, _| async {
            Ok::<_, Error>(Response::new(200, "{}"))
        }))
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| {
                WorkItem::new(
                    Target::resolved(format!("http://a/{}", i)),
                    Target::resolved(format!("http://b/{}", i)),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_no_consumers_is_rejected() {
        let config = PipelineConfig::default().rate_limit(1000.0);
        let pipeline = Pipeline::from_config(
            &config,
            VecSource::new(items(1)),
            fetcher(),
            CancellationToken::new(),
        )
        .unwrap();
        assert!(matches!(pipeline.run().await, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let config = PipelineConfig::default().concurrency(0);
        let result = Pipeline::from_config(
            &config,
            VecSource::new(items(1)),
            fetcher(),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_consumer_error_is_reported_after_others_finish() {
        let counter = CountConsumer::new();
        let config = PipelineConfig::default().rate_limit(1000.0).concurrency(2);

        let failing = consumer_from_fn(|_| async { Err::<(), _>(Error::custom("boom")) });
        let result = Pipeline::from_config(
            &config,
            VecSource::new(items(5)),
            fetcher(),
            CancellationToken::new(),
        )
        .unwrap()
        .consumer(failing)
        .consumer(counter.clone())
        .run()
        .await;

        assert!(matches!(result, Err(Error::Custom(ref m)) if m == "boom"));
        assert_eq!(counter.count(), 5);
    }

    #[tokio::test]
    async fn test_duration_cancels_callers_token() {
        let token = CancellationToken::new();
        let endless = crate::sources::StreamSource::new(tokio_stream::iter(
            std::iter::repeat_with(|| {
                WorkItem::new(Target::resolved("http://a/"), Target::resolved("http://b/"))
            }),
        ));
        let config = PipelineConfig::default()
            .rate_limit(50.0)
            .duration(Duration::from_millis(100));

        Pipeline::from_config(&config, endless, fetcher(), token.clone())
            .unwrap()
            .consumer(CountConsumer::new())
            .run()
            .await
            .unwrap();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_failures_are_logged_below_info() {
        let levels = Arc::new(std::sync::Mutex::new(Vec::new()));
        let _guard = tracing_subscriber::registry()
            .with(LevelRecorder(levels.clone()))
            .set_default();
        let config = PipelineConfig::default().rate_limit(1000.0);

        let failing = consumer_from_fn(|_| async { Err::<(), _>(Error::custom("boom")) });
        let result = Pipeline::from_config(
            &config,
            VecSource::new(items(2)),
            fetcher(),
            CancellationToken::new(),
        )
        .unwrap()
        .consumer(failing)
        .consumer(CountConsumer::new())
        .run()
        .await;
        assert!(result.is_err());

        Pipeline::from_config(&config, BrokenSource, fetcher(), CancellationToken::new())
            .unwrap()
            .consumer(CountConsumer::new())
            .run()
            .await
            .unwrap();

        let levels = levels.lock().unwrap();
        assert!(!levels.is_empty());
        assert!(levels
            .iter()
            .all(|level| *level == tracing::Level::DEBUG || *level == tracing::Level::TRACE));
    }
}
