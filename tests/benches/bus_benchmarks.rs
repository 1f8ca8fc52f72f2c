//! # Plexus Bus Benchmarks
//!
//! Dispatch cost of the in-process bus:
//!
//! | Scenario | What varies |
//! |----------|-------------|
//! | emit fan-out | number of subscribers, tracing on/off |
//! | scoped emit | name rewrite + activity gate |
//! | trace tree | cascade reconstruction from the ring buffer |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use shared_bus::{
    BusConfig, EventCatalog, EventPublisher, EventSubscriber, EventTable, InMemoryEventBus,
    ScopedEventBus, Subscription, TraceMeta,
};

const TICK: &str = "bench:tick";
const ECHO: &str = "bench:echo";

const BENCH_EVENTS: EventTable = EventTable {
    name: "bench",
    events: &[TICK, ECHO],
    tables: &[],
};

fn bus(tracing: bool) -> Arc<InMemoryEventBus> {
    Arc::new(InMemoryEventBus::with_catalog(
        BusConfig::default().with_tracing(tracing),
        EventCatalog::core().with_table(&BENCH_EVENTS),
    ))
}

fn noop(_: &Value, _: &TraceMeta) -> anyhow::Result<()> {
    Ok(())
}

// ============================================================================
// Emit fan-out
// ============================================================================

fn bench_emit_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit-fan-out");
    group.measurement_time(Duration::from_secs(5));

    for tracing in [false, true] {
        for subscribers in [1usize, 10, 100] {
            let bus = bus(tracing);
            let _subs: Vec<Subscription> = (0..subscribers)
                .map(|_| bus.on(TICK, noop).unwrap())
                .collect();
            let label = if tracing { "traced" } else { "untraced" };

            group.throughput(Throughput::Elements(subscribers as u64));
            group.bench_with_input(BenchmarkId::new(label, subscribers), &bus, |b, bus| {
                b.iter(|| black_box(bus.emit(TICK, json!({ "n": 1 })).unwrap()))
            });
        }
    }

    group.finish();
}

// ============================================================================
// Scoped emit
// ============================================================================

fn bench_scoped_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped-emit");

    let scoped = ScopedEventBus::new("bench", bus(true));
    let _sub = scoped.on("local", noop).unwrap();

    group.bench_function("active", |b| {
        b.iter(|| black_box(scoped.emit("local", Value::Null).unwrap()))
    });

    scoped.set_active(false);
    group.bench_function("inactive", |b| {
        b.iter(|| black_box(scoped.emit("local", Value::Null).unwrap()))
    });

    group.finish();
}

// ============================================================================
// Trace tree reconstruction
// ============================================================================

fn bench_trace_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace-tree");

    for depth in [4usize, 16, 48] {
        let bus = Arc::new(InMemoryEventBus::with_catalog(
            BusConfig::default().with_max_emit_depth(depth),
            EventCatalog::core().with_table(&BENCH_EVENTS),
        ));
        let weak = Arc::downgrade(&bus);
        let _echo = bus
            .on(ECHO, move |payload: &Value, meta: &TraceMeta| {
                if let Some(bus) = weak.upgrade() {
                    bus.emit_with_meta(ECHO, payload.clone(), meta.child())?;
                }
                Ok(())
            })
            .unwrap();

        let receipt = bus.emit(ECHO, Value::Null).unwrap().unwrap();
        let tracer = bus.tracer().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &receipt.trace_id, |b, id| {
            b.iter(|| black_box(tracer.get_trace_tree(id)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_emit_fan_out, bench_scoped_emit, bench_trace_tree);
criterion_main!(benches);
