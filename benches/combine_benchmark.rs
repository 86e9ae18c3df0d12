//! Combiner merge cost by venue count and ladder depth.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;

use combobook_rs::config::{CombineConfig, VenueConfig, VenueKind};
use combobook_rs::engine::book::OrderBook;
use combobook_rs::engine::types::{RawLevel, SymbolId, VenueId};
use combobook_rs::market_data::combined_book::DegradeReason;
use combobook_rs::market_data::combiner::{Combiner, VenueRoster};

fn venue_books(venues: usize, depth: usize) -> (Vec<VenueConfig>, Vec<OrderBook>) {
    let symbol = SymbolId::from("ETH-USDC");
    let now = Utc::now();
    let mut configs = Vec::with_capacity(venues);
    let mut books = Vec::with_capacity(venues);

    for v in 0..venues {
        let id = format!("venue-{v}");
        configs.push(
            VenueConfig::new(id.as_str(), VenueKind::Binance, "http://localhost/{symbol}").with_symbol("ETH-USDC", "ETHUSDC"),
        );
        // offset each venue by a cent so prices interleave and sometimes tie
        let offset = Decimal::new((v % 3) as i64, 2);
        let bids = (0..depth).map(|i| RawLevel::new(Decimal::new(300_000 - i as i64 * 5, 2) + offset, Decimal::ONE));
        let asks = (0..depth).map(|i| RawLevel::new(Decimal::new(300_100 + i as i64 * 5, 2) + offset, Decimal::ONE));
        books.push(OrderBook::new(VenueId::from(id), symbol.clone(), bids, asks, now).expect("valid book"));
    }
    (configs, books)
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");
    let symbol = SymbolId::from("ETH-USDC");

    for venues in [2usize, 4, 8] {
        for depth in [20usize, 100] {
            let (configs, books) = venue_books(venues, depth);
            let combiner = Combiner::new(VenueRoster::from_venues(&configs), &CombineConfig::default());
            group.throughput(Throughput::Elements((venues * depth * 2) as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{venues}_venues"), depth),
                &books,
                |b, books| {
                    b.iter(|| {
                        let sources = books.iter().map(|bk| (bk.venue().clone(), Ok::<_, DegradeReason>(bk.clone())));
                        black_box(combiner.combine(&symbol, sources))
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_fill(c: &mut Criterion) {
    let (configs, books) = venue_books(4, 100);
    let combiner = Combiner::new(VenueRoster::from_venues(&configs), &CombineConfig::default());
    let symbol = SymbolId::from("ETH-USDC");
    let book = combiner.combine(&symbol, books.into_iter().map(|bk| (bk.venue().clone(), Ok::<_, DegradeReason>(bk))));

    c.bench_function("fill_base_50", |b| {
        b.iter(|| black_box(book.fill_base(combobook_rs::engine::types::Side::Ask, black_box(Decimal::from(50)))))
    });
}

criterion_group!(benches, bench_combine, bench_fill);
criterion_main!(benches);
