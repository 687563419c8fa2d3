use std::hint::black_box;

use bencher::REQUESTS;
use bytes::BytesMut;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use syncaide_http::codec::RequestDecoder;
use tokio_util::codec::Decoder;

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_decoder");

    for fixture in REQUESTS {
        group.throughput(Throughput::Bytes(fixture.len()));
        group.bench_with_input(BenchmarkId::from_parameter(fixture.name()), &fixture, |b, fixture| {
            let mut request_decoder = RequestDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(fixture.content()),
                |bytes_mut| {
                    let request = request_decoder.decode(bytes_mut).expect("input should be a valid http request").unwrap();
                    black_box(request);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);
