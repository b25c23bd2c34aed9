//! Performance benchmarks for the metadata codec.
//!
//! Measures encoding of requests and decoding of responses for clusters of
//! growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kafka_client_core::protocol::{decode, encode, Buffer, MetadataRequest, MetadataResponse};
use kafka_client_core::testing::responses;

/// A response with `brokers` brokers and `topics` topics of `partitions`
/// partitions each.
fn create_response(brokers: i32, topics: usize, partitions: i32) -> MetadataResponse {
    responses::cluster(
        (0..brokers)
            .map(|id| responses::broker(id, &format!("broker-{id}.kafka.local"), 9092))
            .collect(),
        (0..topics)
            .map(|t| responses::topic(&format!("topic-{t}"), 0, partitions, t as i32 % brokers))
            .collect(),
    )
}

/// Benchmark encoding metadata requests.
fn bench_encode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_metadata_request");

    for topic_count in [1usize, 10, 100] {
        let topics: Vec<String> = (0..topic_count).map(|t| format!("topic-{t}")).collect();
        let request = MetadataRequest::new(topics, false);

        group.throughput(Throughput::Elements(topic_count as u64));
        group.bench_with_input(BenchmarkId::new("topics", topic_count), &request, |b, r| {
            b.iter(|| black_box(encode(r).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark decoding metadata responses.
fn bench_decode_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_metadata_response");

    for (brokers, topics, partitions) in [(1, 1, 1), (3, 10, 12), (12, 100, 50)] {
        let encoded = encode(&create_response(brokers, topics, partitions))
            .unwrap()
            .freeze();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("cluster", format!("{brokers}b/{topics}t/{partitions}p")),
            &encoded,
            |b, bytes| {
                b.iter(|| {
                    let mut buffer = Buffer::from_received(bytes);
                    black_box(decode::<MetadataResponse>(&mut buffer).unwrap())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode_request, bench_decode_response);
criterion_main!(benches);
