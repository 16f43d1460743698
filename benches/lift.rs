//! Lifting throughput on synthetic programs.
//!
//! Two program shapes: straight-line arithmetic (arena pressure, no
//! control flow) and a chain of diamonds (region discovery, phi seeding
//! and wiring on every merge).

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use teallift::{encode, format_program, lift_source_silent, LiftOptions};

/// `int 1` followed by n `int 1` / `+` pairs.
fn straight_line(n: usize) -> String {
    let mut source = String::from("int 1\n");
    for _ in 0..n {
        source.push_str("int 1\n+\n");
    }
    source.push_str("return\n");
    source
}

/// A chain of n branch/merge diamonds, each merging one value.
fn diamond_chain(n: usize) -> String {
    let mut source = String::from("int 1\n");
    for i in 0..n {
        source.push_str(&format!(
            "bnz L{i}\nint 2\nb M{i}\nL{i}:\nint 3\nM{i}:\n"
        ));
    }
    source.push_str("return\n");
    source
}

fn bench_lift(c: &mut Criterion) {
    let line_200 = straight_line(200);
    let diamonds_50 = diamond_chain(50);

    let mut group = c.benchmark_group("lift");
    group.bench_function("straight_line_200", |b| {
        b.iter(|| {
            lift_source_silent(
                black_box(&line_200),
                "bench.teal",
                LiftOptions::default(),
            )
            .unwrap()
        })
    });
    group.bench_function("diamond_chain_50", |b| {
        b.iter(|| {
            lift_source_silent(
                black_box(&diamonds_50),
                "bench.teal",
                LiftOptions::default(),
            )
            .unwrap()
        })
    });
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let diamonds_50 = diamond_chain(50);
    let lifted = lift_source_silent(&diamonds_50, "bench.teal", LiftOptions::default()).unwrap();

    let mut group = c.benchmark_group("render");
    group.bench_function("encode_diamond_chain_50", |b| {
        b.iter(|| encode(black_box(&lifted)))
    });
    let program = encode(&lifted);
    group.bench_function("format_diamond_chain_50", |b| {
        b.iter(|| format_program(black_box(&program)))
    });
    group.finish();
}

criterion_group!(benches, bench_lift, bench_render);
criterion_main!(benches);
