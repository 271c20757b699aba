//! Consumer implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::traits::Consumer;
use crate::types::{FetchResult, PairResult};

/// A consumer that collects every result, in delivery order
#[derive(Clone, Default)]
pub struct CollectConsumer {
    items: Arc<TokioMutex<Vec<PairResult>>>,
}

impl CollectConsumer {
    /// Create a new collect consumer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to the collected items
    pub fn items(&self) -> Arc<TokioMutex<Vec<PairResult>>> {
        self.items.clone()
    }
}

#[async_trait]
impl Consumer for CollectConsumer {
    async fn consume(&mut self, item: PairResult) -> Result<()> {
        self.items.lock().await.push(item);
        Ok(())
    }
}

/// A consumer that counts results
#[derive(Clone, Default)]
pub struct CountConsumer {
    count: Arc<AtomicUsize>,
}

impl CountConsumer {
    /// Create a new count consumer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Consumer for CountConsumer {
    async fn consume(&mut self, _item: PairResult) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Which side of a pair a verdict refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Outcome of comparing the two sides of a [`PairResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Status codes and JSON bodies are equal
    Match { status_code: u16 },
    /// Status codes are equal and bodies were not compared
    StatusMatch { status_code: u16 },
    /// The two sides returned different status codes
    StatusMismatch {
        left_address: String,
        left_status: u16,
        right_address: String,
        right_status: u16,
    },
    /// Same status, different JSON. `paths` is filled only when diffs are requested
    BodyMismatch { address: String, paths: Vec<String> },
    /// One side's body was not valid JSON
    Unparseable {
        side: Side,
        address: String,
        message: String,
    },
    /// One side failed to resolve or fetch
    FetchFailed { side: Side, message: String },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match { .. } | Verdict::StatusMatch { .. })
    }
}

/// Options for [`compare`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Only compare status codes, ignoring bodies
    pub status_code_only: bool,
    /// Report the JSON paths that differ
    pub show_diff: bool,
}

/// Compare the two sides of a pair.
///
/// Fetch failures are reported first, left before right. Bodies are compared
/// as JSON values, so key order and whitespace do not matter.
pub fn compare(pair: &PairResult, options: CompareOptions) -> Verdict {
    let (left_address, left_status, left_body) = match success(&pair.left) {
        Ok(parts) => parts,
        Err(message) => {
            return Verdict::FetchFailed {
                side: Side::Left,
                message,
            }
        }
    };
    let (right_address, right_status, right_body) = match success(&pair.right) {
        Ok(parts) => parts,
        Err(message) => {
            return Verdict::FetchFailed {
                side: Side::Right,
                message,
            }
        }
    };

    if left_status != right_status {
        return Verdict::StatusMismatch {
            left_address: left_address.to_string(),
            left_status,
            right_address: right_address.to_string(),
            right_status,
        };
    }
    if options.status_code_only {
        return Verdict::StatusMatch {
            status_code: left_status,
        };
    }

    let left_json: Value = match serde_json::from_slice(left_body) {
        Ok(value) => value,
        Err(e) => {
            return Verdict::Unparseable {
                side: Side::Left,
                address: left_address.to_string(),
                message: e.to_string(),
            }
        }
    };
    let right_json: Value = match serde_json::from_slice(right_body) {
        Ok(value) => value,
        Err(e) => {
            return Verdict::Unparseable {
                side: Side::Right,
                address: right_address.to_string(),
                message: e.to_string(),
            }
        }
    };

    if left_json == right_json {
        return Verdict::Match {
            status_code: left_status,
        };
    }

    let mut paths = Vec::new();
    if options.show_diff {
        json_diff(&left_json, &right_json, "$", &mut paths);
    }
    Verdict::BodyMismatch {
        address: left_address.to_string(),
        paths,
    }
}

fn success(result: &FetchResult) -> std::result::Result<(&str, u16, &[u8]), String> {
    match result {
        FetchResult::Success {
            status_code,
            body,
            address,
        } => Ok((address, *status_code, body)),
        FetchResult::Failure { error } => Err(error.to_string()),
    }
}

/// Collect the paths at which two JSON values differ.
pub fn json_diff(left: &Value, right: &Value, path: &str, out: &mut Vec<String>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, lv) in l {
                let child = format!("{}.{}", path, key);
                match r.get(key) {
                    Some(rv) => json_diff(lv, rv, &child, out),
                    None => out.push(format!("{} (only left)", child)),
                }
            }
            for key in r.keys().filter(|k| !l.contains_key(*k)) {
                out.push(format!("{}.{} (only right)", path, key));
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            for (i, (lv, rv)) in l.iter().zip(r.iter()).enumerate() {
                json_diff(lv, rv, &format!("{}[{}]", path, i), out);
            }
            if l.len() != r.len() {
                out.push(format!("{} (length {} vs {})", path, l.len(), r.len()));
            }
        }
        (l, r) if l != r => out.push(path.to_string()),
        _ => {}
    }
}

/// Running totals kept by a [`ComparisonConsumer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub matched: usize,
    pub mismatched: usize,
    pub failed: usize,
}

/// Compares each pair and reports the verdict through `tracing`.
///
/// Clones share the same [`Summary`].
#[derive(Clone, Default)]
pub struct ComparisonConsumer {
    options: CompareOptions,
    summary: Arc<TokioMutex<Summary>>,
}

impl ComparisonConsumer {
    /// Create a new comparison consumer
    pub fn new(options: CompareOptions) -> Self {
        Self {
            options,
            summary: Arc::default(),
        }
    }

    /// Get the totals so far
    pub async fn summary(&self) -> Summary {
        *self.summary.lock().await
    }
}

#[async_trait]
impl Consumer for ComparisonConsumer {
    async fn consume(&mut self, item: PairResult) -> Result<()> {
        let verdict = compare(&item, self.options);
        let mut summary = self.summary.lock().await;

        match &verdict {
            Verdict::Match { status_code } => {
                summary.matched += 1;
                info!(target: "pairfetch::compare", status_code, "ok");
            }
            Verdict::StatusMatch { status_code } => {
                summary.matched += 1;
                info!(target: "pairfetch::compare", status_code, "ok status code");
            }
            Verdict::StatusMismatch {
                left_address,
                left_status,
                right_address,
                right_status,
            } => {
                summary.mismatched += 1;
                warn!(
                    target: "pairfetch::compare",
                    left = %left_address,
                    left_status,
                    right = %right_address,
                    right_status,
                    "nok status code"
                );
            }
            Verdict::BodyMismatch { address, paths } => {
                summary.mismatched += 1;
                if paths.is_empty() {
                    warn!(target: "pairfetch::compare", url = %address, "nok json diff");
                } else {
                    warn!(target: "pairfetch::compare", url = %address, diff = ?paths, "nok json diff");
                }
            }
            Verdict::Unparseable {
                side,
                address,
                message,
            } => {
                summary.failed += 1;
                warn!(target: "pairfetch::compare", ?side, url = %address, error = %message, "nok unparseable body");
            }
            Verdict::FetchFailed { side, message } => {
                summary.failed += 1;
                warn!(target: "pairfetch::compare", ?side, error = %message, "error");
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let summary = *self.summary.lock().await;
        info!(
            target: "pairfetch::compare",
            matched = summary.matched,
            mismatched = summary.mismatched,
            failed = summary.failed,
            "comparison finished"
        );
        Ok(())
    }
}
