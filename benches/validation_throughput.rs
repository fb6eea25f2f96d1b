//! Pre-flight validation and frame codec throughput.
//!
//! Validation runs on every resource before any RPC, so it should stay in
//! the sub-microsecond range.

use chrono::{Duration, TimeZone, Utc};
use cloudcost_core::adapter::convert::{actual_request, projected_request};
use cloudcost_core::adapter::TimeRange;
use cloudcost_core::ipc::codec::{encode_msgpack, read_frame, write_frame, MSG_REQUEST, RequestEnvelope};
use cloudcost_core::resource::ResourceDescriptor;
use cloudcost_core::types::ProviderDefaults;
use cloudcost_core::validation::{validate_actual, validate_projected};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::io::Cursor;

const MAX_FRAME: u32 = 5 * 1024 * 1024;

fn ec2() -> ResourceDescriptor {
    ResourceDescriptor::new("aws:ec2/instance:Instance", "web-server", "aws")
        .with_property("instanceType", "t3.micro")
        .with_property("availabilityZone", "us-east-1a")
        .with_property("tags", serde_json::json!({"team": "payments", "env": "prod"}))
}

fn bench_validate(c: &mut Criterion) {
    let defaults = ProviderDefaults::default();
    let projected = projected_request(&ec2(), &defaults);
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let actual = actual_request(
        &ec2(),
        &defaults,
        TimeRange::between(start, start + Duration::days(30)),
    );

    let mut group = c.benchmark_group("validate");
    group.bench_function("projected", |b| {
        b.iter(|| validate_projected(black_box(&projected)))
    });
    group.bench_function("actual", |b| b.iter(|| validate_actual(black_box(&actual))));
    group.bench_function("build_and_validate_projected", |b| {
        let resource = ec2();
        b.iter(|| validate_projected(&projected_request(black_box(&resource), &defaults)))
    });
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("request_frame");
    for &count in &[1usize, 16, 256] {
        let body: Vec<_> = (0..count)
            .map(|_| projected_request(&ec2(), &ProviderDefaults::default()))
            .collect();
        let envelope = RequestEnvelope {
            id: "bench".into(),
            service: "costsource".into(),
            method: "GetProjectedCost".into(),
            body: serde_json::to_value(&body).unwrap(),
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &envelope, |b, env| {
            b.iter(|| {
                rt.block_on(async {
                    let payload = encode_msgpack(black_box(env)).unwrap();
                    let mut buf = Vec::with_capacity(payload.len() + 5);
                    write_frame(&mut buf, MSG_REQUEST, &payload).await.unwrap();
                    let mut cursor = Cursor::new(buf);
                    read_frame(&mut cursor, MAX_FRAME).await.unwrap()
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate, bench_frames);
criterion_main!(benches);
