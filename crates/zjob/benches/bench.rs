use core::hint::black_box;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::{sync::Arc, thread, time::Duration};
use zjob::{Client, Message, Pool, PoolConfig};

#[derive(Clone, Copy, Debug)]
struct RoundTripParams {
    workers: i32,
    clients: usize,
    payload: usize,
}

fn echo_pool(workers: i32) -> Pool {
    Pool::new(
        PoolConfig::new("bench", "127.0.0.1", 0).with_workers(workers),
        Arc::new(|request: Message| request),
    )
    .expect("failed to start pool")
}

fn connect(endpoint: &str) -> Client {
    Client::connect(endpoint)
        .and_then(|c| c.with_timeout(Duration::from_secs(10)))
        .expect("failed to connect")
}

fn bench_single_client(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip/single_client");

    for payload in [16, 1024, 64 * 1024] {
        let pool = echo_pool(1);
        let client = connect(pool.frontend_endpoint());
        let request = vec![0xA5_u8; payload];

        group.throughput(Throughput::Bytes(payload as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payload), &request, |b, req| {
            b.iter(|| black_box(client.request(req).expect("request failed")));
        });

        drop(client);
        pool.shutdown().expect("shutdown failed");
    }

    group.finish();
}

fn bench_concurrent_clients(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip/concurrent");
    group.sample_size(20);

    let params = [
        RoundTripParams {
            workers: 1,
            clients: 8,
            payload: 64,
        },
        RoundTripParams {
            workers: 4,
            clients: 8,
            payload: 64,
        },
        RoundTripParams {
            workers: 0,
            clients: 32,
            payload: 64,
        },
    ];

    for p in params {
        let pool = echo_pool(p.workers);
        let endpoint = pool.frontend_endpoint().to_string();
        let requests_per_client = 100;

        group.throughput(Throughput::Elements((p.clients * requests_per_client) as u64));
        group.bench_function(
            format!("w{}_c{}_b{}", pool.workers_count(), p.clients, p.payload),
            |b| {
                b.iter(|| {
                    let handles: Vec<_> = (0..p.clients)
                        .map(|_| {
                            let endpoint = endpoint.clone();
                            thread::spawn(move || {
                                let client = connect(&endpoint);
                                let request = vec![0_u8; p.payload];
                                for _ in 0..requests_per_client {
                                    black_box(client.request(&request).expect("request failed"));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().expect("client thread panicked");
                    }
                });
            },
        );

        pool.shutdown().expect("shutdown failed");
    }

    group.finish();
}

criterion_group!(benches, bench_single_client, bench_concurrent_clients);
criterion_main!(benches);
