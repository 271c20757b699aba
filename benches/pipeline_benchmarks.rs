use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pairfetch::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

fn items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| {
            WorkItem::new(
                Target::resolved(format!("http://left.example/{}", i)),
                Target::resolved(format!("http://right.example/{}", i)),
            )
        })
        .collect()
}

fn instant_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(fetcher_from_fn(|address: String, _| async move {
        Ok::<_, Error>(Response::new(200, black_box(address).into_bytes()))
    }))
}

fn bench_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("workers");

    for size in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        for workers in [1, 4, 16] {
            group.bench_with_input(
                BenchmarkId::new(format!("concurrency_{}", workers), size),
                size,
                |b, &size| {
                    b.iter(|| {
                        tokio::runtime::Runtime::new().unwrap().block_on(async {
                            let config = PipelineConfig::default()
                                .rate_limit(1_000_000.0)
                                .concurrency(workers)
                                .buffer_size(16);

                            Pipeline::from_config(
                                &config,
                                VecSource::new(items(size)),
                                instant_fetcher(),
                                CancellationToken::new(),
                            )
                            .unwrap()
                            .consumer(CountConsumer::new())
                            .run()
                            .await
                            .unwrap();
                        })
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    for consumers in [1, 2, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("consumers", consumers),
            consumers,
            |b, &consumers| {
                b.iter(|| {
                    tokio::runtime::Runtime::new().unwrap().block_on(async {
                        let config = PipelineConfig::default()
                            .rate_limit(1_000_000.0)
                            .concurrency(4)
                            .buffer_size(16);

                        let mut pipeline = Pipeline::from_config(
                            &config,
                            VecSource::new(items(1000)),
                            instant_fetcher(),
                            CancellationToken::new(),
                        )
                        .unwrap();
                        for _ in 0..consumers {
                            pipeline = pipeline.consumer(CountConsumer::new());
                        }
                        pipeline.run().await.unwrap();
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let pair = PairResult::new(
        FetchResult::from_response(
            "http://left.example/v1/cards",
            Ok(Response::new(200, r#"{"cards":[{"id":1,"tags":["a","b"]}],"total":1}"#)),
        ),
        FetchResult::from_response(
            "http://right.example/v1/cards",
            Ok(Response::new(200, r#"{"total":1,"cards":[{"id":1,"tags":["a","c"]}]}"#)),
        ),
    );
    let options = CompareOptions {
        status_code_only: false,
        show_diff: true,
    };

    c.bench_function("compare_json_diff", |b| {
        b.iter(|| black_box(compare(black_box(&pair), options)))
    });
}

criterion_group!(benches, bench_workers, bench_broadcast, bench_compare);
criterion_main!(benches);
