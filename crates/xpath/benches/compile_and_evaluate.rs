use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use xpath_core::compiler::expr::Axis;
use xpath_core::compiler::{ArithOp, CompareOp};
use xpath_core::engine::runtime::OptimizerOptions;
use xpath_core::types::{Cardinality, ItemType, NodeTest, SequenceType};
use xpath_core::{
    DynamicContextBuilder, ExprArena, ExprId, ExpandedName, SimpleNode, StaticContext, StaticContextBuilder,
    XdmAtomicValue, XdmItem, attr, compile, doc, elem, text,
};

fn create_catalog(sections: usize, entries: usize) -> SimpleNode {
    let mut catalog = elem("catalog");
    for i in 0..sections {
        let mut section = elem("section").attr(attr("id", &format!("s{i}")));
        for j in 0..entries {
            section = section.child(
                elem("entry")
                    .attr(attr("rank", &j.to_string()))
                    .child(elem("title").child(text(&format!("Entry {j} of section {i}")))),
            );
        }
        catalog = catalog.child(section);
    }
    doc().child(catalog).build()
}

/// `$items[position() > 500]`
fn tail_filter(arena: &mut ExprArena) -> ExprId {
    let base = arena.global_var(ExpandedName::local("items"));
    let pos = arena.fn_call("position", vec![]).unwrap();
    let bound = arena.integer(500);
    let pred = arena.general_comparison(CompareOp::Gt, pos, bound);
    arena.filter(base, pred)
}

/// `for $i in $items return $i * count($items)`
fn invariant_loop(arena: &mut ExprArena) -> ExprId {
    let i = arena.declare_var(ExpandedName::local("i"));
    let seq = arena.global_var(ExpandedName::local("items"));
    let i_ref = arena.var_ref(i);
    let items = arena.global_var(ExpandedName::local("items"));
    let count = arena.fn_call("count", vec![items]).unwrap();
    let body = arena.arithmetic(ArithOp::Times, i_ref, count);
    arena.for_expr(i, seq, body)
}

/// `//entry[last()]/title`
fn last_entries(arena: &mut ExprArena) -> ExprId {
    let start = arena.root();
    let all = arena.axis(Axis::DescendantOrSelf, NodeTest::AnyNode);
    let entry = arena.axis(Axis::Child, NodeTest::element("entry"));
    let last = arena.fn_call("last", vec![]).unwrap();
    let entry = arena.filter(entry, last);
    let title = arena.axis(Axis::Child, NodeTest::element("title"));
    arena.path(start, vec![all, entry, title])
}

fn static_context(options: OptimizerOptions) -> StaticContext {
    StaticContextBuilder::new()
        .with_variable(ExpandedName::local("items"), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
        .with_optimizer(options)
        .build()
}

type Build = fn(&mut ExprArena) -> ExprId;

const EXPRESSIONS: [(&str, Build); 3] =
    [("tail_filter", tail_filter), ("invariant_loop", invariant_loop), ("last_entries", last_entries)];

fn benchmark_compile(c: &mut Criterion) {
    let static_ctx = static_context(OptimizerOptions::default());
    let mut group = c.benchmark_group("compile");
    for (name, build) in EXPRESSIONS {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut arena = ExprArena::new();
                let root = build(&mut arena);
                black_box(compile(arena, root, &static_ctx).unwrap())
            });
        });
    }
    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let items: Vec<XdmItem<SimpleNode>> = (1..=1000).map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(i))).collect();
    let ctx = DynamicContextBuilder::<SimpleNode>::default()
        .with_context_item(create_catalog(50, 40))
        .with_variable(ExpandedName::local("items"), items)
        .build();

    let mut group = c.benchmark_group("evaluate");
    let plain = OptimizerOptions { positional_rewrites: false, loop_lifting: false, ..OptimizerOptions::default() };
    for (label, options) in [("optimized", OptimizerOptions::default()), ("plain", plain)] {
        let static_ctx = static_context(options);
        for (name, build) in EXPRESSIONS {
            let mut arena = ExprArena::new();
            let root = build(&mut arena);
            let compiled = compile(arena, root, &static_ctx).unwrap();
            group.bench_with_input(BenchmarkId::new(label, name), &compiled, |b, compiled| {
                b.iter(|| {
                    let result = compiled.evaluate(black_box(&ctx)).unwrap();
                    black_box(result.len())
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_evaluate);
criterion_main!(benches);
