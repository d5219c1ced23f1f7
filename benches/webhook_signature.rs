use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http::{HeaderMap, HeaderValue};

use shop_api::webhooks::{sign, stripe_signature_header, verify_signature};

const SECRET: &str = "whsec_bench_secret";
const NOW: i64 = 1_700_000_000;

fn payload(size: usize) -> Vec<u8> {
    let mut body = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_test_1","pad":""#.to_vec();
    body.extend(std::iter::repeat(b'x').take(size));
    body.extend_from_slice(br#""}}}"#);
    body
}

fn signing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("webhook_sign");

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let body = payload(size);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| sign(black_box(SECRET), NOW, black_box(body)));
        });
    }

    group.finish();
}

fn verification_benchmark(c: &mut Criterion) {
    let body = payload(4 * 1024);
    let mut headers = HeaderMap::new();
    let header = stripe_signature_header(SECRET, NOW, &body);
    if let Ok(value) = HeaderValue::from_str(&header) {
        headers.insert("stripe-signature", value);
    }

    c.bench_function("webhook_verify_valid", |b| {
        b.iter(|| verify_signature(black_box(&headers), black_box(&body), SECRET, 300, NOW));
    });

    c.bench_function("webhook_verify_wrong_secret", |b| {
        b.iter(|| verify_signature(black_box(&headers), black_box(&body), "whsec_other", 300, NOW));
    });
}

criterion_group!(benches, signing_benchmark, verification_benchmark);
criterion_main!(benches);
