//! Compare two in-memory "deployments" path by path
//!
//! Run with: cargo run --example compare

use std::sync::Arc;
use std::time::Duration;

use pairfetch::prelude::*;

/// Serves canned JSON; the right deployment disagrees on `/v1/users`
fn fake_deployments() -> Arc<dyn Fetcher> {
    Arc::new(fetcher_from_fn(|address: String, _headers| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = match address.rsplit_once(".example") {
            Some((_, "/v1/users")) if address.contains("right") => {
                Response::new(200, r#"{"users":[1,2,3]}"#)
            }
            Some((_, "/v1/users")) => Response::new(200, r#"{"users":[1,2]}"#),
            Some((_, "/v1/missing")) => Response::new(404, r#"{"error":"not found"}"#),
            _ => Response::new(200, r#"{"ok":true}"#),
        };
        Ok::<_, Error>(response)
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Paired Comparison Example ===");

    let paths = "/v1/health\n/v1/users\n/v1/missing\n\n/v1/cards?query=123\n";
    let hosts = vec![
        "http://left.example".to_string(),
        "http://right.example".to_string(),
    ];
    let source = PathListSource::new(paths.as_bytes(), &hosts)?;

    let comparison = ComparisonConsumer::new(CompareOptions {
        status_code_only: false,
        show_diff: true,
    });
    let collector = CollectConsumer::new();

    let config = PipelineConfig::default()
        .concurrency(2)
        .rate_limit(20.0)
        .headers(parse_headers("X-Auth-Token: token")?);

    Pipeline::from_config(&config, source, fake_deployments(), CancellationToken::new())?
        .consumer(comparison.clone())
        .consumer(collector.clone())
        .run()
        .await?;

    let items = collector.items();
    for pair in items.lock().await.iter() {
        println!(
            "{:<40} {:?} / {:?}",
            pair.left.address().unwrap_or("-"),
            pair.left.status_code(),
            pair.right.status_code()
        );
    }

    let summary = comparison.summary().await;
    println!(
        "matched: {}, mismatched: {}, failed: {}",
        summary.matched, summary.mismatched, summary.failed
    );
    Ok(())
}
