//! Layout computation benchmarks.
//!
//! Run with: cargo bench --bench layout

use common::types::CardId;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use room_client::layout::{compute_layout, ViewportClass};
use room_client::presentation::Presentation;

fn bench_compute_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_layout");
    for count in [4usize, 16, 40, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                compute_layout(
                    black_box(count),
                    black_box(false),
                    ViewportClass::LargeDesktop,
                    black_box(1),
                )
            });
        });
    }
    group.finish();
}

fn bench_presentation_relayout(c: &mut Criterion) {
    let mut group = c.benchmark_group("presentation_relayout");
    for count in [16usize, 200] {
        let mut presentation = Presentation::new(ViewportClass::Tablet, true);
        let cards: Vec<CardId> = (0..count).map(|_| CardId::new()).collect();
        for card in &cards {
            presentation.add_card(*card);
        }
        if let Some(first) = cards.first() {
            let _ = presentation.toggle_pin(*first);
        }

        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| black_box(presentation.next_page()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compute_layout, bench_presentation_relayout);
criterion_main!(benches);
