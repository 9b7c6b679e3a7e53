//! Benchmarks for orderbook operations.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use depth_sync::orderbook::OrderBook;
use depth_sync::types::{DepthUpdate, PriceLevel};
use rust_decimal::Decimal;

/// Book with `size` levels per side around 50000.00, tick 0.01
fn populated_book(size: u32) -> OrderBook {
    let tick = Decimal::new(1, 2);
    let mid = Decimal::from(50_000);
    let qty = Decimal::new(15, 1);

    let bids: Vec<_> = (1..=size)
        .map(|i| PriceLevel::new(mid - tick * Decimal::from(i), qty))
        .collect();
    let asks: Vec<_> = (1..=size)
        .map(|i| PriceLevel::new(mid + tick * Decimal::from(i), qty))
        .collect();

    let mut book = OrderBook::new("BENCH");
    book.set_snapshot(&bids, &asks, 1);
    book
}

fn bench_apply_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_update");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut book = populated_book(size);
            let price = Decimal::from(50_000) - Decimal::new(5, 2);
            let mut id = 1u64;

            b.iter(|| {
                // Typical diff: one level changed on each side
                id += 1;
                let update = DepthUpdate::new(
                    id,
                    id,
                    vec![PriceLevel::new(price, Decimal::from(id % 7))],
                    vec![PriceLevel::new(price + Decimal::ONE, Decimal::from(id % 5))],
                );
                black_box(book.apply_update(black_box(&update)));
            });
        });
    }

    group.finish();
}

fn bench_top_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_levels");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let book = populated_book(size);

            b.iter(|| {
                black_box(book.top_levels(black_box(5)));
            });
        });
    }

    group.finish();
}

fn bench_mid_price(c: &mut Criterion) {
    let book = populated_book(500);

    c.bench_function("mid_price", |b| {
        b.iter(|| {
            black_box(book.mid_price());
        });
    });
}

criterion_group!(benches, bench_apply_update, bench_top_levels, bench_mid_price);
criterion_main!(benches);
