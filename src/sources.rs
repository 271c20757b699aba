//! Work source implementations.
//!
//! Every source here builds [`WorkItem`]s lazily; the pipeline pulls them one
//! at a time as workers free up.

use async_trait::async_trait;
use futures_core::Stream;
use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use url::Url;

use crate::error::{Error, Result};
use crate::traits::WorkSource;
use crate::types::{Target, WorkItem};

/// A source that yields items from a vector
pub struct VecSource {
    items: VecDeque<WorkItem>,
}

impl VecSource {
    /// Create a new vector source
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Get the number of remaining items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl WorkSource for VecSource {
    async fn next_item(&mut self) -> Result<Option<WorkItem>> {
        Ok(self.items.pop_front())
    }
}

/// A source backed by any stream of work items, finite or not
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = WorkItem> + Unpin + Send,
{
    /// Create a new stream source
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> WorkSource for StreamSource<S>
where
    S: Stream<Item = WorkItem> + Unpin + Send,
{
    async fn next_item(&mut self) -> Result<Option<WorkItem>> {
        Ok(self.stream.next().await)
    }
}

/// Reads relative paths, one per line, and pairs each with two hosts.
///
/// Blank lines are skipped. A host that is not a valid `http` or `https`
/// base URL, a path that does not start with `/`, or a line that is not
/// UTF-8 produces unresolved targets rather than an error, so one bad line
/// does not stop the run.
pub struct PathListSource<R> {
    reader: R,
    line: Vec<u8>,
    line_number: usize,
    left_host: String,
    right_host: String,
}

impl<R> PathListSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Create a source over `reader`. Exactly two hosts are required.
    pub fn new(reader: R, hosts: &[String]) -> Result<Self> {
        match hosts {
            [left, right] => Ok(Self {
                reader,
                line: Vec::new(),
                line_number: 0,
                left_host: left.clone(),
                right_host: right.clone(),
            }),
            _ => Err(Error::configuration(format!(
                "exactly 2 hosts must be specified, got {}",
                hosts.len()
            ))),
        }
    }
}

impl PathListSource<BufReader<File>> {
    /// Open a path list file
    pub async fn open(path: impl AsRef<Path>, hosts: &[String]) -> Result<Self> {
        let file = File::open(path.as_ref()).await.map_err(|e| {
            Error::configuration(format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        Self::new(BufReader::new(file), hosts)
    }
}

#[async_trait]
impl<R> WorkSource for PathListSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_item(&mut self) -> Result<Option<WorkItem>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let path = match std::str::from_utf8(&self.line) {
                Ok(line) => line.trim(),
                Err(e) => {
                    let reason = format!("line {} is not valid UTF-8: {}", self.line_number, e);
                    return Ok(Some(WorkItem::new(
                        Target::unresolved(reason.clone()),
                        Target::unresolved(reason),
                    )));
                }
            };
            if path.is_empty() {
                continue;
            }

            return Ok(Some(WorkItem::new(
                join_target(&self.left_host, path),
                join_target(&self.right_host, path),
            )));
        }
    }
}

/// Join a base URL and a relative path into a target.
///
/// The host must parse as an `http` or `https` URL with no query or
/// fragment. The path, query included, is appended to the host's own path.
pub fn join_target(host: &str, path: &str) -> Target {
    let base = match Url::parse(host) {
        Ok(base) => base,
        Err(e) => return Target::unresolved(format!("invalid host {:?}: {}", host, e)),
    };
    if !matches!(base.scheme(), "http" | "https") {
        return Target::unresolved(format!("host {:?} has no http or https scheme", host));
    }
    if base.query().is_some() || base.fragment().is_some() {
        return Target::unresolved(format!("host {:?} must not carry a query or fragment", host));
    }
    if !path.starts_with('/') {
        return Target::unresolved(format!("path {:?} must start with '/'", path));
    }

    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    match Url::parse(&joined) {
        Ok(url) => Target::resolved(url.as_str()),
        Err(e) => Target::unresolved(format!("cannot join {:?} onto {:?}: {}", path, host, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hosts() -> Vec<String> {
        vec![
            "http://left.example".to_string(),
            "https://right.example/".to_string(),
        ]
    }

    #[test]
    fn test_join_target() {
        assert_eq!(
            join_target("http://a.example/", "/v1/cards?query=123").address(),
            Some("http://a.example/v1/cards?query=123")
        );
        assert_eq!(
            join_target("https://a.example/api", "/v1").address(),
            Some("https://a.example/api/v1")
        );
        assert!(join_target("a.example", "/x").address().is_none());
        assert!(join_target("http://", "/x").address().is_none());
        assert!(join_target("http://a.example", "x").address().is_none());
        assert!(join_target("ftp://a.example", "/x").address().is_none());
    }

    #[test]
    fn test_malformed_hosts_are_unresolved() {
        for host in [
            "http://exa mple.com",
            "http://host:notaport",
            "http://[::1",
            "http://a.example?x=1",
            "http://a.example/#top",
        ] {
            let target = join_target(host, "/x");
            assert!(
                matches!(target, Target::Unresolved(Error::Resolution(_))),
                "{} resolved to {:?}",
                host,
                target.address()
            );
        }
    }

    #[test]
    fn test_requires_two_hosts() {
        let one = vec!["http://a".to_string()];
        let result = PathListSource::new(&b""[..], &one);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_reads_paths_skipping_blank_lines() {
        let input = b"/v1/a\n\n  /v1/b?x=1  \n";
        let mut source = PathListSource::new(&input[..], &hosts()).unwrap();

        let first = source.next_item().await.unwrap().unwrap();
        assert_eq!(first.left.address(), Some("http://left.example/v1/a"));
        assert_eq!(first.right.address(), Some("https://right.example/v1/a"));

        let second = source.next_item().await.unwrap().unwrap();
        assert_eq!(second.left.address(), Some("http://left.example/v1/b?x=1"));

        assert!(source.next_item().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_line_is_carried_as_data() {
        let input = b"/a\n\xff\xfe\n/b\n/c\n";
        let mut source = PathListSource::new(&input[..], &hosts()).unwrap();

        let first = source.next_item().await.unwrap().unwrap();
        assert_eq!(first.left.address(), Some("http://left.example/a"));

        let bad = source.next_item().await.unwrap().unwrap();
        assert!(matches!(bad.left, Target::Unresolved(Error::Resolution(_))));
        assert!(matches!(bad.right, Target::Unresolved(Error::Resolution(_))));

        let mut rest = Vec::new();
        while let Some(item) = source.next_item().await.unwrap() {
            rest.push(item.right.address().unwrap().to_string());
        }
        assert_eq!(rest, ["https://right.example/b", "https://right.example/c"]);
    }

    #[tokio::test]
    async fn test_bad_host_is_carried_as_data() {
        let hosts = vec!["left.example".to_string(), "http://right.example".to_string()];
        let mut source = PathListSource::new(&b"/ping\n"[..], &hosts).unwrap();

        let item = source.next_item().await.unwrap().unwrap();
        assert!(matches!(item.left, Target::Unresolved(Error::Resolution(_))));
        assert_eq!(item.right.address(), Some("http://right.example/ping"));
    }

    #[tokio::test]
    async fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/health").unwrap();
        writeln!(file, "/status").unwrap();

        let mut source = PathListSource::open(file.path(), &hosts()).await.unwrap();
        let mut count = 0;
        while source.next_item().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_stream_source() {
        let items = (0..3).map(|i| {
            WorkItem::new(
                Target::resolved(format!("http://a/{}", i)),
                Target::resolved(format!("http://b/{}", i)),
            )
        });
        let mut source = StreamSource::new(tokio_stream::iter(items));
        let mut count = 0;
        while source.next_item().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
