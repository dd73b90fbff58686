use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{Dispatcher, InboundMessage, RoutingTable, handler_fn};

fn populated_table() -> RoutingTable {
    let mut table = RoutingTable::new();
    for aggregate in ["customer", "order", "product", "invoice", "shipment"] {
        for verb in ["created", "updated", "deleted"] {
            table.register(&format!("{aggregate}.{verb}"), handler_fn(|_| Ok(())));
        }
        table.register(&format!("{aggregate}.*"), handler_fn(|_| Ok(())));
    }
    table.register("#", handler_fn(|_| Ok(())));
    table
}

fn bench_resolve(c: &mut Criterion) {
    let table = populated_table();

    c.bench_function("routing/resolve_exact", |b| {
        b.iter(|| table.resolve("order.created"));
    });

    c.bench_function("routing/resolve_prefix", |b| {
        b.iter(|| table.resolve("shipment.dispatched"));
    });

    c.bench_function("routing/resolve_catch_all", |b| {
        b.iter(|| table.resolve("audit.logged"));
    });
}

fn bench_deliver(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = Dispatcher::new(populated_table());
    let payload = br#"{"type":"order.created","order":{"orderId":1,"productIds":[1,2]}}"#;

    c.bench_function("dispatcher/deliver", |b| {
        b.iter(|| {
            rt.block_on(async {
                dispatcher
                    .deliver(&InboundMessage::new("order.created", payload))
                    .await
            })
        });
    });
}

criterion_group!(benches, bench_resolve, bench_deliver);
criterion_main!(benches);
