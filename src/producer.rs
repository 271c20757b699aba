//! The fetch-and-join stage.
//!
//! A fixed pool of workers pulls [`WorkItem`]s from one input stream, takes a
//! permit from the shared [`RateLimiter`], fetches both sides concurrently
//! and emits the joined [`PairResult`] on a single output stream. Results
//! arrive in completion order, not submission order.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;
use crate::traits::Fetcher;
use crate::types::{FetchResult, Headers, PairResult, Target, WorkItem};
use crate::util::CancellableExt;

/// Configuration and collaborators for the worker pool.
pub struct Producer {
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<RateLimiter>,
    headers: Headers,
    concurrency: usize,
    buffer_size: usize,
}

struct Shared {
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<RateLimiter>,
    headers: Headers,
}

impl Producer {
    /// Create a producer with a single worker and no headers
    pub fn new(fetcher: Arc<dyn Fetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            fetcher,
            limiter,
            headers: Headers::new(),
            concurrency: 1,
            buffer_size: 1,
        }
    }

    /// Set the number of workers
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    /// Set the headers sent with every fetch
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the capacity of the output stream
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Check the worker count and buffer size.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::configuration("concurrency must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(Error::configuration("buffer size must be at least 1"));
        }
        Ok(())
    }

    /// Start the workers and return the output stream.
    ///
    /// The output closes once every worker has exited, either because the
    /// input was drained or because `token` was cancelled. Cancellation
    /// cannot interrupt a fetch already in progress; its result is dropped.
    pub fn produce(
        self,
        input: mpsc::Receiver<WorkItem>,
        token: CancellationToken,
    ) -> Result<mpsc::Receiver<PairResult>> {
        self.validate()?;

        let (tx, rx) = mpsc::channel(self.buffer_size);
        let input = Arc::new(Mutex::new(input));
        let shared = Arc::new(Shared {
            fetcher: self.fetcher,
            limiter: self.limiter,
            headers: self.headers,
        });

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            workers.spawn(run_worker(
                id,
                shared.clone(),
                input.clone(),
                tx.clone(),
                token.clone(),
            ));
        }
        drop(tx);

        tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    debug!(error = %e, "producer worker panicked");
                }
            }
            debug!("all producer workers exited");
        });

        Ok(rx)
    }
}

async fn run_worker(
    id: usize,
    shared: Arc<Shared>,
    input: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    output: mpsc::Sender<PairResult>,
    token: CancellationToken,
) {
    trace!(worker = id, "producer worker started");

    loop {
        let next = async { input.lock().await.recv().await }
            .cancellable(&token)
            .await;
        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => {
                trace!(worker = id, "input drained");
                break;
            }
            Err(_) => {
                trace!(worker = id, "cancelled while waiting for work");
                break;
            }
        };

        if shared.limiter.take().cancellable(&token).await.is_err() {
            trace!(worker = id, "cancelled while throttled");
            break;
        }

        let pair = shared.fetch_pair(item).await;

        #[cfg(feature = "metrics")]
        metrics::counter!("pairfetch_pairs_produced_total").increment(1);

        match output.send(pair).cancellable(&token).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                debug!(worker = id, "output stream closed");
                break;
            }
            Err(_) => {
                trace!(worker = id, "cancelled before emitting, dropping result");
                break;
            }
        }
    }

    trace!(worker = id, "producer worker exited");
}

impl Shared {
    async fn fetch_pair(&self, item: WorkItem) -> PairResult {
        let (left, right) = tokio::join!(self.fetch_one(item.left), self.fetch_one(item.right));
        PairResult::new(left, right)
    }

    async fn fetch_one(&self, target: Target) -> FetchResult {
        let result = match target {
            Target::Unresolved(error) => FetchResult::failure(error),
            Target::Resolved(address) => {
                let outcome = self.fetcher.fetch(&address, &self.headers).await;
                FetchResult::from_response(&address, outcome)
            }
        };

        #[cfg(feature = "metrics")]
        if !result.is_success() {
            metrics::counter!("pairfetch_fetch_errors_total").increment(1);
        }

        result
    }
}
