//! End-to-end client-server benchmarks over loopback.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use wsline_client::WebSocket;
use wsline_core::Message;
use wsline_server::{Server, ServerConfig};

async fn echo(mut socket: WebSocket, _peer: SocketAddr) {
    while let Some(Ok(message)) = socket.next_message().await {
        if socket.send(message).await.is_err() {
            break;
        }
    }
}

fn setup_server_and_client(rt: &Runtime) -> (Arc<Server>, SocketAddr, WebSocket) {
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(Server::new(ServerConfig::new(addr), echo));
        let runner = server.clone();
        tokio::spawn(async move {
            let _ = runner.serve(listener).await;
        });

        let socket = wsline_client::connect(&format!("ws://{}/", addr))
            .await
            .unwrap();
        (server, addr, socket)
    })
}

fn bench_echo_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (server, _addr, mut socket) = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_echo");

    for size in [16, 1024, 64 * 1024] {
        let message = Message::binary(vec![b'x'; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| {
                rt.block_on(async {
                    socket.send(message.clone()).await.unwrap();
                    black_box(socket.next_message().await.unwrap().unwrap())
                })
            });
        });
    }

    group.finish();
    server.shutdown();
}

fn bench_pipelined(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (server, _addr, mut socket) = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_pipelined");

    for batch in [10, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                rt.block_on(async {
                    for i in 0..batch {
                        socket.send_text(format!("message {}", i)).await.unwrap();
                    }
                    for _ in 0..batch {
                        black_box(socket.next_message().await.unwrap().unwrap());
                    }
                })
            });
        });
    }

    group.finish();
    server.shutdown();
}

fn bench_connect(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (server, addr, socket) = setup_server_and_client(&rt);
    drop(socket);
    let url = format!("ws://{}/", addr);

    c.bench_function("e2e_connect", |b| {
        b.iter(|| {
            rt.block_on(async {
                let socket = wsline_client::connect(&url).await.unwrap();
                socket.close().await.unwrap();
            })
        });
    });

    server.shutdown();
}

criterion_group!(benches, bench_echo_round_trip, bench_pipelined, bench_connect);
criterion_main!(benches);
