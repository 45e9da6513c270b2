//! Criterion benchmarks for the layout resolver.
//!
//! Run with:
//! ```bash
//! cargo bench --package hid-handler-core --bench layout_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hid_handler_core::{LayoutDefinition, LayoutRegistry, Modifier};

fn registry() -> LayoutRegistry {
    let mut layouts = LayoutRegistry::new();
    layouts.register_layout(
        LayoutDefinition::new("fr-azerty")
            .with_key("04", "q Q")
            .with_key("14", "a A")
            .with_key("1A", "z Z")
            .with_key("1D", "w W")
            .with_key("33", "m M"),
    );
    layouts
}

fn bench_keycode_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let layouts = registry();

    group.bench_function("generic_numeric", |b| {
        b.iter(|| layouts.get_layout_keycode(black_box("generic"), black_box(0x04u8), &[]))
    });

    group.bench_function("variant_shifted", |b| {
        b.iter(|| {
            layouts.get_layout_keycode(
                black_box("fr-azerty"),
                black_box("1a"),
                &[Modifier::LeftShift],
            )
        })
    });

    // Unknown variant resolves through the derived family
    group.bench_function("family_fallback", |b| {
        b.iter(|| layouts.get_layout_keycode(black_box("fr-bepo"), black_box(0x14u8), &[]))
    });

    group.finish();
}

fn bench_register_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");

    group.bench_function("register_with_generic_backfill", |b| {
        b.iter(|| {
            let mut layouts = LayoutRegistry::new();
            layouts.register_layout(black_box(
                LayoutDefinition::new("de-qwertz")
                    .with_key("1C", "z Z")
                    .with_key("1D", "y Y"),
            ));
            layouts
        })
    });

    group.finish();
}

criterion_group!(benches, bench_keycode_lookup, bench_register_layout);
criterion_main!(benches);
