//! Data carried through the pipeline.
//!
//! A [`WorkItem`] enters the producer, a [`PairResult`] leaves it. Everything
//! here is immutable once it has been placed on a stream.

use std::collections::HashMap;

use crate::error::Error;

/// Header set applied uniformly to every fetch.
pub type Headers = HashMap<String, String>;

/// One side of a [`WorkItem`].
///
/// Resolution failures are carried as data so a single bad input never aborts
/// the pipeline.
#[derive(Debug, Clone)]
pub enum Target {
    /// An address the fetcher can use as-is
    Resolved(String),
    /// An address that could not be built, with the reason
    Unresolved(Error),
}

impl Target {
    /// Create a resolved target
    pub fn resolved<S: Into<String>>(address: S) -> Self {
        Target::Resolved(address.into())
    }

    /// Create a target carrying a resolution failure
    pub fn unresolved<S: Into<String>>(reason: S) -> Self {
        Target::Unresolved(Error::resolution(reason))
    }

    /// The address, if the target resolved
    pub fn address(&self) -> Option<&str> {
        match self {
            Target::Resolved(address) => Some(address),
            Target::Unresolved(_) => None,
        }
    }
}

/// One unit of comparison work: a left and a right target.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub left: Target,
    pub right: Target,
}

impl WorkItem {
    /// Create a new work item
    pub fn new(left: Target, right: Target) -> Self {
        Self { left, right }
    }
}

/// A successful fetch as reported by a [`Fetcher`](crate::traits::Fetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl Response {
    /// Create a new response
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

/// Outcome of fetching one target. Exactly one of success or error is present.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success {
        status_code: u16,
        body: Vec<u8>,
        address: String,
    },
    Failure {
        error: Error,
    },
}

impl FetchResult {
    /// Build the result of a fetch from the target address and fetcher outcome
    pub fn from_response(address: &str, outcome: crate::error::Result<Response>) -> Self {
        match outcome {
            Ok(response) => FetchResult::Success {
                status_code: response.status_code,
                body: response.body,
                address: address.to_string(),
            },
            Err(error) => FetchResult::Failure { error },
        }
    }

    /// Create a failed result
    pub fn failure(error: Error) -> Self {
        FetchResult::Failure { error }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchResult::Success { status_code, .. } => Some(*status_code),
            FetchResult::Failure { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            FetchResult::Success { body, .. } => Some(body),
            FetchResult::Failure { .. } => None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            FetchResult::Success { address, .. } => Some(address),
            FetchResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            FetchResult::Success { .. } => None,
            FetchResult::Failure { error } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// The joined left and right results for one [`WorkItem`].
///
/// `left` always corresponds to the item's left target, whichever fetch
/// finished first.
#[derive(Debug, Clone)]
pub struct PairResult {
    pub left: FetchResult,
    pub right: FetchResult,
}

impl PairResult {
    /// Create a new pair result
    pub fn new(left: FetchResult, right: FetchResult) -> Self {
        Self { left, right }
    }

    /// True when both sides succeeded with the same status code
    pub fn status_codes_equal(&self) -> bool {
        match (self.left.status_code(), self.right.status_code()) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }
}
