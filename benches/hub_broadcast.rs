use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vote_consumer::hub::Hub;

fn broadcast_to_subscribers(subscriber_count: usize) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        let hub = Hub::spawn();
        let mut subscriptions = Vec::with_capacity(subscriber_count);
        for _ in 0..subscriber_count {
            subscriptions.push(hub.subscribe("bench-poll").await);
        }

        hub.broadcast("bench-poll", b"{\"A\":1}".to_vec()).await;

        for sub in &mut subscriptions {
            black_box(sub.recv().await);
        }
    });
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_broadcast");
    for subscriber_count in [1, 10, 100, 1000] {
        group.bench_function(format!("{subscriber_count}_subscribers"), |b| {
            b.iter(|| broadcast_to_subscribers(subscriber_count));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_broadcast);
criterion_main!(benches);
