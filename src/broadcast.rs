//! Tee from one result stream to many consumer streams.
//!
//! A single relay task is the only writer to every consumer stream, so every
//! consumer observes the same results in the same order. The relay does not
//! read the next result until every live consumer has room for the current
//! one; the slowest consumer therefore gates the whole pipeline.
//!
//! On cancellation the relay stops at once and closes every stream. Results
//! still buffered in the producer are dropped. Delivery of a single result is
//! all-or-nothing: a slot is reserved in every stream before anything is
//! sent, so cancellation can never leave a result with only some consumers.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::PairResult;
use crate::util::CancellableExt;

/// Duplicates one stream of [`PairResult`]s into `N` identical streams.
pub struct Broadcaster {
    consumers: usize,
    buffer_size: usize,
    token: CancellationToken,
}

impl Broadcaster {
    /// Create a broadcaster for `consumers` streams
    pub fn new(consumers: usize, token: CancellationToken) -> Self {
        Self {
            consumers,
            buffer_size: 1,
            token,
        }
    }

    /// Set the capacity of each consumer stream
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Start the relay and return one stream per consumer, in registration order.
    pub fn spawn(
        self,
        input: mpsc::Receiver<PairResult>,
    ) -> Result<(Vec<mpsc::Receiver<PairResult>>, JoinHandle<()>)> {
        if self.consumers == 0 {
            return Err(Error::configuration("at least one consumer is required"));
        }
        if self.buffer_size == 0 {
            return Err(Error::configuration("buffer size must be at least 1"));
        }

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.consumers)
            .map(|_| mpsc::channel(self.buffer_size))
            .unzip();

        let relay = tokio::spawn(relay(input, senders, self.token));
        Ok((receivers, relay))
    }
}

async fn relay(
    mut input: mpsc::Receiver<PairResult>,
    mut senders: Vec<mpsc::Sender<PairResult>>,
    token: CancellationToken,
) {
    let mut relayed = 0usize;

    loop {
        let item = match input.recv().cancellable(&token).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(relayed, "producer stream exhausted");
                break;
            }
            Err(_) => {
                debug!(relayed, "cancelled, dropping undelivered results");
                break;
            }
        };

        // the permits borrow `senders`; they must be gone before detaching
        let (permits, closed) = match reserve_all(&senders).cancellable(&token).await {
            Ok(reserved) => reserved,
            Err(_) => {
                debug!(relayed, "cancelled while delivering, result dropped");
                break;
            }
        };

        deliver(permits, item);
        relayed += 1;

        #[cfg(feature = "metrics")]
        metrics::counter!("pairfetch_pairs_broadcast_total").increment(1);

        for index in closed.into_iter().rev() {
            trace!(stream = index, "consumer stream closed, detaching");
            senders.remove(index);
        }
        if senders.is_empty() {
            debug!(relayed, "every consumer stream closed");
            break;
        }
    }

    // dropping the senders closes every consumer stream
}

/// Reserve one slot in each open stream, returning the permits and the
/// indices of streams found closed.
async fn reserve_all(
    senders: &[mpsc::Sender<PairResult>],
) -> (Vec<mpsc::Permit<'_, PairResult>>, Vec<usize>) {
    let mut permits = Vec::with_capacity(senders.len());
    let mut closed = Vec::new();

    for (index, sender) in senders.iter().enumerate() {
        match sender.reserve().await {
            Ok(permit) => permits.push(permit),
            Err(_) => closed.push(index),
        }
    }

    (permits, closed)
}

fn deliver(mut permits: Vec<mpsc::Permit<'_, PairResult>>, item: PairResult) {
    let last = permits.pop();
    for permit in permits {
        permit.send(item.clone());
    }
    if let Some(permit) = last {
        permit.send(item);
    }
}
