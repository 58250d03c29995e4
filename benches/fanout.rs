use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use http::{Request, Response, StatusCode};
use quorum_http::prelude::{
    EndpointTarget, FanoutClient, QuorumThreshold, RetryPolicy, SuccessStatusHandler,
};
use quorum_http::{ReqBody, Transport, TransportFuture, full_res_body};
use tokio::runtime::Runtime;

/// Answers immediately; hosts whose name starts with `down` return 500.
struct InMemoryTransport;

impl Transport for InMemoryTransport {
    fn execute(&self, request: Request<ReqBody>) -> TransportFuture<'_> {
        let status = match request.uri().host() {
            Some(host) if host.starts_with("down") => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        };
        Box::pin(async move {
            let mut response = Response::new(full_res_body(r#"{"ok":true}"#));
            *response.status_mut() = status;
            Ok(response)
        })
    }
}

fn benchmark_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn benchmark_client() -> Arc<FanoutClient> {
    Arc::new(
        FanoutClient::builder()
            .transport(InMemoryTransport)
            .retry_policy(RetryPolicy::standard().max_attempts(2))
            .build(),
    )
}

fn replicas(count: usize, down: usize) -> Arc<Vec<EndpointTarget>> {
    Arc::new(
        (0..count)
            .map(|index| {
                let host = if index < down { "down" } else { "up" };
                EndpointTarget::new(index, format!("http://{host}-{index}.bench"))
            })
            .collect(),
    )
}

fn bench_wait_all(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client();

    let mut group = c.benchmark_group("wait_all");
    group.sample_size(60);
    for count in [3_usize, 8, 32] {
        let targets = replicas(count, 0);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.to_async(&runtime).iter(|| {
                let client = Arc::clone(&client);
                let targets = Arc::clone(&targets);
                async move {
                    let result = client
                        .get("/v1/ping")
                        .then(SuccessStatusHandler)
                        .wait(&targets)
                        .await;
                    black_box(result.is_ok());
                }
            });
        });
    }
    group.finish();
}

fn bench_first_success(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client();
    let targets = replicas(8, 4);

    let mut group = c.benchmark_group("first_success");
    group.sample_size(60);
    group.bench_function("half_down_8", |b| {
        b.to_async(&runtime).iter(|| {
            let client = Arc::clone(&client);
            let targets = Arc::clone(&targets);
            async move {
                let outcome = client
                    .get("/v1/ping")
                    .then(SuccessStatusHandler)
                    .first(&targets)
                    .await
                    .expect("an up replica should answer");
                black_box(outcome.target().index());
            }
        });
    });
    group.finish();
}

fn bench_quorum_write(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client();
    let targets = replicas(5, 2);

    let mut group = c.benchmark_group("quorum_write");
    group.sample_size(60);
    group.bench_function("majority_of_5", |b| {
        b.to_async(&runtime).iter(|| {
            let client = Arc::clone(&client);
            let targets = Arc::clone(&targets);
            async move {
                let report = client
                    .put("/v1/file/meta")
                    .body(r#"{"owner":"bench"}"#)
                    .quorum(QuorumThreshold::Majority)
                    .run(&targets)
                    .await;
                black_box(report.is_met());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_wait_all,
    bench_first_success,
    bench_quorum_write
);
criterion_main!(benches);
