//! Connection engine benchmarks.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wsline_core::{Connection, EngineConfig, Handler, MessageKind, Transport};
use wsline_protocol::Frame;

/// Transport that discards everything written to it.
struct Sink;

impl Transport for Sink {
    fn write(&mut self, _data: Bytes) -> bool {
        true
    }

    fn end(&mut self, _data: Bytes) {}

    fn destroy(&mut self) {}
}

#[derive(Default)]
struct Counter {
    messages: usize,
    bytes: usize,
}

impl Handler for Counter {
    fn on_message(&mut self, _kind: MessageKind, payload: Bytes) {
        self.messages += 1;
        self.bytes += payload.len();
    }
}

fn server() -> Connection<Sink, Counter> {
    Connection::server(Sink, Counter::default(), &EngineConfig::default())
}

/// A masked message split into `fragments` frames.
fn fragmented(size: usize, fragments: usize) -> Bytes {
    let payload = vec![b'x'; size];
    let chunk = size.div_ceil(fragments).max(1);
    let pieces: Vec<&[u8]> = payload.chunks(chunk).collect();
    let last = pieces.len() - 1;

    let mut buf = BytesMut::new();
    for (i, piece) in pieces.into_iter().enumerate() {
        let frame = if i == 0 {
            Frame::binary(Bytes::copy_from_slice(piece))
        } else {
            Frame::new(wsline_protocol::OpCode::Continuation, Bytes::copy_from_slice(piece))
        };
        frame
            .with_fin(i == last)
            .with_mask([1, 2, 3, 4])
            .encode_to(&mut buf)
            .unwrap();
    }
    buf.freeze()
}

fn bench_receive_single_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_receive_single");

    for size in [100, 4096, 64 * 1024] {
        let wire = fragmented(size, 1);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, wire| {
            let mut conn = server();
            b.iter(|| conn.receive(black_box(wire)).unwrap());
        });
    }

    group.finish();
}

fn bench_receive_fragmented(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_receive_fragmented");

    let size = 64 * 1024;
    for fragments in [2, 16, 128] {
        let wire = fragmented(size, fragments);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fragments), &wire, |b, wire| {
            let mut conn = server();
            b.iter(|| conn.receive(black_box(wire)).unwrap());
        });
    }

    group.finish();
}

fn bench_receive_byte_at_a_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_receive_trickle");
    let wire = fragmented(1024, 4);

    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("1KiB_4_fragments", |b| {
        let mut conn = server();
        b.iter(|| {
            for byte in wire.chunks(1) {
                conn.receive(byte).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_send");

    for size in [100, 4096, 64 * 1024] {
        let payload = Bytes::from(vec![b'x'; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("server", size), &payload, |b, payload| {
            let mut conn = server();
            b.iter(|| conn.send(payload.clone(), MessageKind::Binary, Box::new(|_| {})));
        });
        group.bench_with_input(BenchmarkId::new("client", size), &payload, |b, payload| {
            let mut conn = Connection::client(Counter::default(), &EngineConfig::default());
            conn.attach(Sink, &[]).unwrap();
            b.iter(|| conn.send(payload.clone(), MessageKind::Binary, Box::new(|_| {})));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_receive_single_frame,
    bench_receive_fragmented,
    bench_receive_byte_at_a_time,
    bench_send
);
criterion_main!(benches);
