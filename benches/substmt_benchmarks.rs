//! Performance benchmarks for the compilation hot paths.
//!
//! - `substmt`: the generic substatement compiler over growing child counts
//! - `module`: full module compilation with nested containers and leaves

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use modelscript::compiler::{CompileCtx, CompileOptions, compile_module, compile_substatements};
use modelscript::prelude::*;

fn substmt_children(count: usize) -> Vec<ParsedStmt> {
    let mut children = vec![ParsedStmt::with_arg(StmtKind::Argument, "x")];
    for i in 0..count {
        children.push(ParsedStmt::with_arg(
            StmtKind::Description,
            format!("description {i}"),
        ));
    }
    children
}

fn module_with_leaves(leaves: usize) -> ParsedStmt {
    let mut container = ParsedStmt::with_arg(StmtKind::Container, "system");
    for i in 0..leaves {
        container = container.child(
            ParsedStmt::with_arg(StmtKind::Leaf, format!("leaf-{i}"))
                .child(ParsedStmt::with_arg(StmtKind::Type, "string"))
                .child(ParsedStmt::with_arg(StmtKind::Description, "generated")),
        );
    }
    ParsedStmt::with_arg(StmtKind::Module, "bench")
        .child(ParsedStmt::with_arg(StmtKind::Namespace, "urn:bench"))
        .child(ParsedStmt::with_arg(StmtKind::Prefix, "b"))
        .child(container)
}

fn bench_substmt(c: &mut Criterion) {
    let ctx = Context::new();
    let table = SubstmtTable::new(vec![
        SubstmtDescriptor::new(StmtKind::Argument, Cardinality::Opt),
        SubstmtDescriptor::new(StmtKind::Description, Cardinality::Any),
    ])
    .unwrap();

    let mut group = c.benchmark_group("substmt");
    for count in [8usize, 64, 512] {
        let children = substmt_children(count);
        group.throughput(Throughput::Elements(children.len() as u64));
        group.bench_function(format!("compile_{count}"), |b| {
            b.iter(|| {
                let mut cctx = CompileCtx::new(&ctx, "bench", CompileOptions::empty());
                black_box(
                    compile_substatements(&mut cctx, black_box(&table), black_box(&children))
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_module(c: &mut Criterion) {
    let ctx = Context::new();
    let mut group = c.benchmark_group("module");
    for leaves in [10usize, 100, 1000] {
        let parsed = module_with_leaves(leaves);
        group.throughput(Throughput::Elements(leaves as u64));
        group.bench_function(format!("compile_{leaves}_leaves"), |b| {
            b.iter(|| black_box(compile_module(&ctx, black_box(&parsed)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_substmt, bench_module);
criterion_main!(benches);
