//! Benchmarks for the rewrite-schema engine
//!
//! Measures performance of:
//! - Diff narrowing and decomposition of whole-file pairs
//! - Generalization of N candidate units
//! - Matching and rebuilding against a fresh fragment
//! - Coverage over a corpus

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;

use genesis::config::EngineConfig;
use genesis::diff::{CandidateUnit, decompose};
use genesis::ir::build::*;
use genesis::ir::kind::KindTag;
use genesis::ir::node::{BinaryOp, Node, Visibility, preorder};
use genesis::ir::site::Site;
use genesis::ir::types::JavaType;
use genesis::mining::{self, Example};
use genesis::schema::SchemaInstance;
use genesis::session::Session;

// ============================================================================
// Sample trees
// ============================================================================

/// A class whose method sums `width` parameters, optionally incremented.
fn sample_file(width: usize, name: &str, incremented: bool) -> Arc<Node> {
    let params: Vec<Node> = (0..width)
        .map(|i| parameter(JavaType::int(), &format!("{}{}", name, i)))
        .collect();
    let sum = (1..width).fold(read_param(&format!("{}0", name), JavaType::int()), |acc, i| {
        binary(BinaryOp::Add, acc, read_param(&format!("{}{}", name, i), JavaType::int()))
    });
    let value = if incremented { binary(BinaryOp::Add, sum, int(1)) } else { sum };
    Arc::new(unit(
        "bench",
        vec![class(modifiers(Visibility::Public, false), "Sample", None, vec![method(
            modifiers(Visibility::Public, false),
            "total",
            JavaType::int(),
            params,
            Some(block(vec![
                local_var(JavaType::int(), "t", Some(value)),
                ret(Some(read_local("t", JavaType::int()))),
            ])),
        )])],
    ))
}

fn statement_unit(width: usize, name: &str) -> CandidateUnit {
    decompose(sample_file(width, name, false), sample_file(width, name, true), &EngineConfig::default())
        .into_iter()
        .find(|u| u.before_node().tag() == KindTag::LocalVariable)
        .expect("sample pair differs in its local declaration")
}

// ============================================================================
// Benchmark: Decomposition
// ============================================================================

fn bench_decompose(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompose");
    let config = EngineConfig::default();

    for width in [2, 8, 32] {
        let before = sample_file(width, "p", false);
        let after = sample_file(width, "p", true);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| black_box(decompose(Arc::clone(&before), Arc::clone(&after), &config)))
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Generalization
// ============================================================================

fn bench_generalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("generalize");
    let session = Session::from_units(&[], EngineConfig::default());

    for count in [1, 4, 16] {
        let units: Vec<CandidateUnit> = (0..count).map(|i| statement_unit(8, &format!("v{}_", i))).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &units, |b, units| {
            b.iter(|| black_box(mining::generalize(&session, units)))
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Match and rebuild
// ============================================================================

fn bench_match_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_rebuild");
    let session = Session::from_units(&[], EngineConfig::default());
    let schema = mining::generalize(&session, &[statement_unit(8, "a"), statement_unit(8, "b")])
        .expect("sample units generalize");

    let target = sample_file(8, "z", false);
    let declaration = preorder(&target)
        .into_iter()
        .find(|n| n.tag() == KindTag::LocalVariable)
        .expect("sample has a local declaration");
    let site = Site::locate(&target, &declaration).expect("declaration is in the tree");

    group.bench_function("match", |b| {
        b.iter(|| {
            let mut instance = SchemaInstance::new(&schema, &session);
            black_box(instance.match_site(&site))
        })
    });

    group.bench_function("match_rebuild", |b| {
        b.iter(|| {
            let mut instance = SchemaInstance::new(&schema, &session);
            instance.match_site(&site);
            black_box(instance.rebuild())
        })
    });

    group.bench_function("type_checked", |b| {
        b.iter(|| {
            let mut instance = SchemaInstance::new(&schema, &session);
            instance.match_site(&site);
            black_box(instance.type_checked(&site))
        })
    });

    group.finish();
}

// ============================================================================
// Benchmark: Coverage
// ============================================================================

fn bench_coverage(c: &mut Criterion) {
    let mut group = c.benchmark_group("coverage");
    let session = Session::from_units(&[], EngineConfig::default());
    let schema = mining::generalize(&session, &[statement_unit(8, "a"), statement_unit(8, "b")])
        .expect("sample units generalize");

    for size in [16, 128] {
        let corpus: Vec<Example> = (0..size)
            .map(|i| Example::new(i, statement_unit(8, &format!("c{}_", i))))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &corpus, |b, corpus| {
            b.iter(|| black_box(mining::coverage(&session, &schema, corpus)))
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2));
    targets =
        bench_decompose,
        bench_generalize,
        bench_match_rebuild,
        bench_coverage
}

criterion_main!(benches);
