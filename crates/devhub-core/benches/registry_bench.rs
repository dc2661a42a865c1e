//! Criterion benchmarks for the device registry hot path.
//!
//! Script connections hit `lookup` on every `STATUS` command, and every
//! device registration takes the same lock, so insert/lookup latency is the
//! number that matters under load.
//!
//! Run with:
//! ```bash
//! cargo bench --package devhub-core --bench registry_bench
//! ```

use std::io;
use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use devhub_core::{Device, DeviceRegistry};

// ── Fixtures ──────────────────────────────────────────────────────────────────

struct BenchDevice {
    id: String,
    connected_at: Instant,
}

impl BenchDevice {
    fn new(id: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            connected_at: Instant::now(),
        })
    }
}

impl Device for BenchDevice {
    fn unique_identifier(&self) -> &str {
        &self.id
    }

    fn connected_at(&self) -> Instant {
        self.connected_at
    }

    fn is_active(&self) -> bool {
        true
    }

    fn stop(&self) {}

    fn close_socket(&self) -> io::Result<()> {
        Ok(())
    }
}

fn populated_registry(n: usize) -> DeviceRegistry {
    let registry = DeviceRegistry::new();
    for i in 0..n {
        registry.insert(BenchDevice::new(format!("device-{i}")));
    }
    registry
}

// ── Benches ───────────────────────────────────────────────────────────────────

fn bench_lookup(c: &mut Criterion) {
    let registry = populated_registry(32);
    c.bench_function("registry_lookup_hit", |b| {
        b.iter(|| black_box(registry.lookup(black_box("device-17"))))
    });
    c.bench_function("registry_lookup_miss", |b| {
        b.iter(|| black_box(registry.lookup(black_box("device-unknown"))))
    });
}

fn bench_insert_replace(c: &mut Criterion) {
    let registry = populated_registry(32);
    c.bench_function("registry_insert_replace", |b| {
        b.iter(|| registry.insert(BenchDevice::new("device-17".to_owned())))
    });
}

fn bench_count(c: &mut Criterion) {
    let registry = populated_registry(32);
    c.bench_function("registry_count", |b| b.iter(|| black_box(registry.count())));
}

criterion_group!(benches, bench_lookup, bench_insert_replace, bench_count);
criterion_main!(benches);
