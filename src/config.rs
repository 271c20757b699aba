//! Run configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ratelimit::interval_for;
use crate::types::Headers;

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Number of producer workers
    pub concurrency: usize,
    /// Aggregate fetch rate across all workers, in work items per second
    pub rate_limit: f64,
    /// Total run duration; zero runs until the input is drained
    pub duration: Duration,
    /// Capacity of each stream between stages
    pub buffer_size: usize,
    /// Headers sent with every fetch
    pub headers: Headers,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rate_limit: 5.0,
            duration: Duration::ZERO,
            buffer_size: 1,
            headers: Headers::new(),
        }
    }
}

impl PipelineConfig {
    /// Set the number of workers
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    /// Set the aggregate rate limit
    pub fn rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limit = per_second;
        self
    }

    /// Set the total run duration
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the stream capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Reject settings the pipeline cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::configuration("concurrency must be at least 1"));
        }
        interval_for(self.rate_limit)?;
        if self.buffer_size == 0 {
            return Err(Error::configuration("buffer size must be at least 1"));
        }
        Ok(())
    }
}

/// Parse a comma-separated header list such as
/// `"X-Auth-Token: token, X-Public: false"`.
///
/// An empty string yields no headers. Entries without a `:` or with an empty
/// name are rejected.
pub fn parse_headers(raw: &str) -> Result<Headers> {
    let mut headers = Headers::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| Error::configuration(format!("malformed header {:?}", entry)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::configuration(format!(
                "header {:?} has an empty name",
                entry
            )));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }

    Ok(headers)
}
