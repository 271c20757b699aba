//! # Paired fetch-and-compare pipeline
//!
//! This crate fetches the same relative resource from two hosts, joins the
//! two responses, and hands every joined result to any number of consumers.
//!
//! ## Core Concepts
//!
//! - **WorkSource**: Yields work items, each a left and a right target
//! - **Producer**: A rate-limited worker pool that fetches both sides of an item concurrently
//! - **Broadcaster**: Tees the producer's output to every consumer in the same order
//! - **Consumer**: Acts on joined results (compare, log, collect)
//! - **Pipeline**: Wires the stages together under one cancellation token
//!
//! ## Example
//!
//! ```rust
//! use pairfetch::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let fetcher = Arc::new(fetcher_from_fn(|_address, _headers| async {
//!         Ok::<_, Error>(Response::new(200, r#"{"ok":true}"#))
//!     }));
//!     let source = VecSource::new(vec![WorkItem::new(
//!         Target::resolved("http://left.example/v1/health"),
//!         Target::resolved("http://right.example/v1/health"),
//!     )]);
//!     let config = PipelineConfig::default().concurrency(2).rate_limit(10.0);
//!
//!     Pipeline::from_config(&config, source, fetcher, CancellationToken::new())?
//!         .consumer(ComparisonConsumer::new(CompareOptions::default()))
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod consumers;
pub mod error;
pub mod pipeline;
pub mod producer;
pub mod ratelimit;
pub mod sources;
pub mod traits;
pub mod types;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::broadcast::Broadcaster;
    pub use crate::config::{parse_headers, PipelineConfig};
    pub use crate::consumers::{
        compare, CollectConsumer, CompareOptions, ComparisonConsumer, CountConsumer, Verdict,
    };
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::Pipeline;
    pub use crate::producer::Producer;
    pub use crate::ratelimit::RateLimiter;
    pub use crate::sources::{PathListSource, StreamSource, VecSource};
    pub use crate::traits::{Consumer, Fetcher, WorkSource};
    pub use crate::types::{FetchResult, Headers, PairResult, Response, Target, WorkItem};
    pub use crate::util::{cancel_after, consumer_from_fn, fetcher_from_fn, CancellableExt};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
