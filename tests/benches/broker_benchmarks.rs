//! # Region RPC Broker Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Frame encode/decode | Microseconds per frame |
//! | Registry lookup | Flat in the number of racks |
//! | Cached call | No round trip to the rack |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use region_rpc::testing::{counting_rack_handlers, trusted_pair};
use region_rpc::{Client, Dispatcher, Registry};
use serde_json::json;
use shared_bus::NoOpEventPublisher;
use shared_types::{Arguments, Frame, RackIdentity};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-codec");

    let mut arguments = Arguments::new();
    arguments.insert("system_id".into(), json!("node-1"));
    arguments.insert("power_type".into(), json!("ipmi"));
    arguments.insert(
        "context".into(),
        json!({ "power_address": "10.0.0.1", "power_user": "admin" }),
    );
    let frame = Frame::request(7, "PowerQuery", arguments);
    let encoded = frame.encode().unwrap();

    group.bench_function("encode", |b| b.iter(|| black_box(&frame).encode().unwrap()));
    group.bench_function("decode", |b| {
        b.iter(|| Frame::decode(black_box(&encoded)).unwrap())
    });
    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("registry-lookup");

    for racks in [10usize, 100] {
        let registry = Arc::new(Registry::new(Arc::new(NoOpEventPublisher)));
        // Connection tasks are spawned onto `rt`.
        let _pairs: Vec<_> = rt.block_on(async {
            (0..racks)
                .map(|n| {
                    let pair = trusted_pair(&registry, Dispatcher::new());
                    registry
                        .register(&RackIdentity::new(format!("rack-{n}")), &pair.local)
                        .unwrap();
                    pair
                })
                .collect()
        });
        let target = RackIdentity::new(format!("rack-{}", racks / 2));

        group.bench_with_input(BenchmarkId::new("get_client_for", racks), &racks, |b, _| {
            b.iter(|| {
                rt.block_on(registry.get_client_for(black_box(&target), Duration::ZERO))
                    .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("get_all_clients", racks), &racks, |b, _| {
            b.iter(|| registry.get_all_clients())
        });
    }
    group.finish();
}

fn bench_client_call(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("client-call");

    let registry = Arc::new(Registry::new(Arc::new(NoOpEventPublisher)));
    let (handlers, _) = counting_rack_handlers();
    let pair = rt.block_on(async { trusted_pair(&registry, handlers) });
    let client = Client::new(Arc::clone(&pair.local));

    rt.block_on(client.call("DescribePowerTypes", Arguments::new()))
        .unwrap();
    group.bench_function("cached", |b| {
        b.iter(|| {
            rt.block_on(client.call("DescribePowerTypes", Arguments::new()))
                .unwrap()
        })
    });

    let mut arguments = Arguments::new();
    arguments.insert("system_id".into(), json!("node-1"));
    group.bench_function("round-trip", |b| {
        b.iter(|| {
            rt.block_on(client.call("PowerQuery", arguments.clone()))
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_registry_lookup, bench_client_call);
criterion_main!(benches);
