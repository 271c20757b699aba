//! Collaborator traits for the paired fetch pipeline.
//!
//! The pipeline owns scheduling, throttling, pairing and broadcast. Where the
//! work comes from, how a target is fetched and what happens to a joined
//! result are supplied through these seams.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Headers, PairResult, Response, WorkItem};

/// A source of work items.
///
/// The pipeline reads a source exactly once from a single task. Returning
/// `Ok(None)` signals end of input, not failure.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pairfetch::error::Result;
/// use pairfetch::traits::WorkSource;
/// use pairfetch::types::{Target, WorkItem};
///
/// struct Once(bool);
///
/// #[async_trait]
/// impl WorkSource for Once {
///     async fn next_item(&mut self) -> Result<Option<WorkItem>> {
///         if std::mem::replace(&mut self.0, true) {
///             return Ok(None);
///         }
///         Ok(Some(WorkItem::new(
///             Target::resolved("http://left.example/health"),
///             Target::resolved("http://right.example/health"),
///         )))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkSource {
    /// Produce the next work item, or None once the source is exhausted.
    async fn next_item(&mut self) -> Result<Option<WorkItem>>;
}

/// Fetches one side of a work item.
///
/// Implementations must be safe to call concurrently from many workers. The
/// pipeline never retries; an `Err` becomes the error of that side.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, address: &str, headers: &Headers) -> Result<Response>;
}

/// A consumer processes joined results from one broadcast stream.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pairfetch::error::Result;
/// use pairfetch::traits::Consumer;
/// use pairfetch::types::PairResult;
///
/// struct Mismatches(usize);
///
/// #[async_trait]
/// impl Consumer for Mismatches {
///     async fn consume(&mut self, item: PairResult) -> Result<()> {
///         if !item.status_codes_equal() {
///             self.0 += 1;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Consumer {
    /// Process a single result.
    async fn consume(&mut self, item: PairResult) -> Result<()>;

    /// Called once the stream has closed, whether drained or cancelled.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, address: &str, headers: &Headers) -> Result<Response> {
        (**self).fetch(address, headers).await
    }
}

#[async_trait]
impl<C: Consumer + Send + ?Sized> Consumer for Box<C> {
    async fn consume(&mut self, item: PairResult) -> Result<()> {
        (**self).consume(item).await
    }

    async fn finish(&mut self) -> Result<()> {
        (**self).finish().await
    }
}
