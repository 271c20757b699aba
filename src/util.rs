//! Cancellation helpers and closure adapters.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{Consumer, Fetcher};
use crate::types::{Headers, PairResult, Response};

/// Helper function to create a fetcher from an async closure
pub fn fetcher_from_fn<F, Fut>(f: F) -> FnFetcher<F, Fut>
where
    F: Fn(String, Headers) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    FnFetcher {
        f,
        _phantom: PhantomData,
    }
}

/// A fetcher created from a function
pub struct FnFetcher<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F, Fut>
where
    F: Fn(String, Headers) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn fetch(&self, address: &str, headers: &Headers) -> Result<Response> {
        (self.f)(address.to_string(), headers.clone()).await
    }
}

/// Helper function to create a consumer from an async closure
pub fn consumer_from_fn<F, Fut>(f: F) -> FnConsumer<F, Fut>
where
    F: FnMut(PairResult) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    FnConsumer {
        f,
        _phantom: PhantomData,
    }
}

/// A consumer created from a function
pub struct FnConsumer<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Consumer for FnConsumer<F, Fut>
where
    F: FnMut(PairResult) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn consume(&mut self, item: PairResult) -> Result<()> {
        (self.f)(item).await
    }
}

/// A future that resolves to `Err(Error::Cancelled)` as soon as its token fires.
///
/// Cancellation is checked before the inner future on every poll, so a
/// future that becomes ready in the same poll as the token is still dropped.
pub struct Cancellable<F> {
    future: Pin<Box<F>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<F> Cancellable<F> {
    /// Create a new cancellable future
    pub fn new(future: F, token: CancellationToken) -> Self {
        Self {
            future: Box::pin(future),
            cancelled: Box::pin(token.cancelled_owned()),
        }
    }
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Result<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        match self.future.as_mut().poll(cx) {
            Poll::Ready(output) => Poll::Ready(Ok(output)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Extension trait for making futures cancellable
pub trait CancellableExt: Future + Sized {
    /// Race this future against `token`
    fn cancellable(self, token: &CancellationToken) -> Cancellable<Self> {
        Cancellable::new(self, token.clone())
    }
}

impl<F: Future> CancellableExt for F {}

/// Cancel `token` once `duration` has elapsed.
///
/// A zero duration means unbounded and spawns nothing. The timer task exits
/// early if the token is cancelled by someone else.
pub fn cancel_after(token: &CancellationToken, duration: Duration) -> Option<JoinHandle<()>> {
    if duration.is_zero() {
        return None;
    }

    let token = token.clone();
    Some(tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(duration) => {
                debug!(?duration, "run duration elapsed, cancelling pipeline");
                token.cancel();
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_completes() {
        let token = CancellationToken::new();
        let value = async { 7 }.cancellable(&token).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancellable_wakes_on_cancel() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = std::future::pending::<()>().cancellable(&token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_ready_future() {
        let token = CancellationToken::new();
        token.cancel();
        let result = async { 1 }.cancellable(&token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_after() {
        let token = CancellationToken::new();
        assert!(cancel_after(&token, Duration::ZERO).is_none());

        let timer = cancel_after(&token, Duration::from_millis(20)).unwrap();
        timer.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_fetcher_from_fn() {
        let fetcher = fetcher_from_fn(|address, _headers| async move {
            Ok::<_, Error>(Response::new(200, address.into_bytes()))
        });
        let response = fetcher.fetch("http://a/ping", &Headers::new()).await.unwrap();
        assert_eq!(response.body, b"http://a/ping".to_vec());
    }
}
