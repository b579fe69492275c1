use rstest::rstest;
use xpath_core::compiler::functions::SystemFunction;
use xpath_core::compiler::{ArithOp, CompareOp, ExprKind};
use xpath_core::engine::runtime::OptimizerOptions;
use xpath_core::types::{Cardinality, ItemType, SequenceType};
use xpath_core::{
    CompiledXPath, DynamicContextBuilder, ExprArena, ExprId, ExpandedName, SimpleNode, StaticContext,
    StaticContextBuilder, XdmAtomicValue, XdmItem, compile,
};

const ITEMS: [i64; 7] = [10, 11, 12, 13, 14, 15, 16];

fn items() -> ExpandedName {
    ExpandedName::local("items")
}

fn static_context(options: OptimizerOptions) -> StaticContext {
    StaticContextBuilder::new()
        .with_variable(items(), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
        .with_variable(ExpandedName::local("n"), SequenceType::new(ItemType::DOUBLE, Cardinality::ZERO_OR_ONE))
        .with_variable(ExpandedName::local("k"), SequenceType::new(ItemType::INTEGER, Cardinality::EXACTLY_ONE))
        .with_optimizer(options)
        .with_trace_optimizer_decisions(true)
        .build()
}

fn evaluate(compiled: &CompiledXPath, n: Option<f64>) -> Vec<i64> {
    evaluate_with(compiled, n, 0)
}

fn evaluate_with(compiled: &CompiledXPath, n: Option<f64>, k: i64) -> Vec<i64> {
    let n: Vec<XdmItem<SimpleNode>> = n.map(|v| XdmItem::Atomic(XdmAtomicValue::Double(v))).into_iter().collect();
    let values = ITEMS.iter().map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(*i))).collect::<Vec<_>>();
    let dynamic = DynamicContextBuilder::new()
        .with_variable(items(), values)
        .with_variable(ExpandedName::local("n"), n)
        .with_variable(ExpandedName::local("k"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(k))])
        .build();
    compiled
        .evaluate(&dynamic)
        .unwrap()
        .into_iter()
        .map(|item| match item {
            XdmItem::Atomic(XdmAtomicValue::Integer(i)) => i,
            other => panic!("expected an integer, got {other:?}"),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Integer(i64),
    Double(f64),
    Variable,
    IntegerVariable,
}

/// `$items[position() op bound]`
fn positional_filter(op: CompareOp, bound: Bound) -> (ExprArena, ExprId) {
    let mut arena = ExprArena::new();
    let base = arena.global_var(items());
    let pos = arena.fn_call("position", vec![]).unwrap();
    let bound = match bound {
        Bound::Integer(i) => arena.integer(i),
        Bound::Double(d) => arena.double(d),
        Bound::Variable => arena.global_var(ExpandedName::local("n")),
        Bound::IntegerVariable => arena.global_var(ExpandedName::local("k")),
    };
    let pred = arena.general_comparison(op, pos, bound);
    let filter = arena.filter(base, pred);
    (arena, filter)
}

fn expected(op: CompareOp, bound: Option<f64>) -> Vec<i64> {
    let Some(bound) = bound else { return Vec::new() };
    ITEMS
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            match op {
                CompareOp::Eq => p == bound,
                CompareOp::Ne => p != bound,
                CompareOp::Lt => p < bound,
                CompareOp::Le => p <= bound,
                CompareOp::Gt => p > bound,
                CompareOp::Ge => p >= bound,
            }
        })
        .map(|(_, v)| *v)
        .collect()
}

#[rstest]
fn literal_bounds_match_unoptimized_filtering(
    #[values(CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge)] op: CompareOp,
    #[values(
        Bound::Integer(-1),
        Bound::Integer(0),
        Bound::Integer(1),
        Bound::Integer(3),
        Bound::Integer(7),
        Bound::Integer(9),
        Bound::Double(2.5),
        Bound::Double(3.0),
        Bound::Double(-0.5),
        Bound::Integer(i64::MIN),
        Bound::Integer(i64::MAX),
        Bound::Double(1e20),
        Bound::Double(-1e20)
    )]
    bound: Bound,
) {
    let value = match bound {
        Bound::Integer(i) => i as f64,
        Bound::Double(d) => d,
        Bound::Variable | Bound::IntegerVariable => unreachable!(),
    };
    let (arena, root) = positional_filter(op, bound);
    let compiled = compile(arena, root, &static_context(OptimizerOptions::default())).unwrap();
    assert_eq!(evaluate(&compiled, None), expected(op, Some(value)), "{op:?} {bound:?}");
    assert_ne!(compiled.arena().kind(compiled.root()).name(), "filter", "{op:?} {bound:?} was not rewritten");
}

#[rstest]
fn variable_bounds_match_unoptimized_filtering(
    #[values(CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge)] op: CompareOp,
    #[values(None, Some(0.0), Some(1.0), Some(2.5), Some(4.0), Some(7.0), Some(12.0), Some(f64::NAN), Some(1e20), Some(-1e20))]
    n: Option<f64>,
) {
    let (arena, root) = positional_filter(op, Bound::Variable);
    let optimized = compile(arena, root, &static_context(OptimizerOptions::default())).unwrap();
    let (arena, root) = positional_filter(op, Bound::Variable);
    let plain = OptimizerOptions { positional_rewrites: false, loop_lifting: false, ..OptimizerOptions::default() };
    let unoptimized = compile(arena, root, &static_context(plain)).unwrap();

    assert_eq!(evaluate(&optimized, n), expected(op, n), "{op:?} {n:?}");
    assert_eq!(evaluate(&unoptimized, n), expected(op, n), "{op:?} {n:?}");
    assert!(optimized.optimizer_trace().iter().any(|t| t.rewrite == "positional-filter"));
    assert!(!unoptimized.optimizer_trace().iter().any(|t| t.rewrite == "positional-filter"));
}

#[rstest]
fn integer_variable_bounds_match_unoptimized_filtering(
    #[values(CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge)] op: CompareOp,
    #[values(i64::MIN, -1, 0, 1, 4, 7, i64::MAX)] k: i64,
) {
    let (arena, root) = positional_filter(op, Bound::IntegerVariable);
    let optimized = compile(arena, root, &static_context(OptimizerOptions::default())).unwrap();
    let (arena, root) = positional_filter(op, Bound::IntegerVariable);
    let plain = OptimizerOptions { positional_rewrites: false, loop_lifting: false, ..OptimizerOptions::default() };
    let unoptimized = compile(arena, root, &static_context(plain)).unwrap();

    let bound = Some(k as f64);
    assert_eq!(evaluate_with(&optimized, None, k), expected(op, bound), "{op:?} {k}");
    assert_eq!(evaluate_with(&unoptimized, None, k), expected(op, bound), "{op:?} {k}");
    assert!(optimized.optimizer_trace().iter().any(|t| t.rewrite == "positional-filter"));
}

#[rstest]
#[case::first(1, "first")]
#[case::subscript(3, "subscript")]
fn numeric_predicate_selects_one_item(#[case] index: i64, #[case] kind: &str) {
    let mut arena = ExprArena::new();
    let base = arena.global_var(items());
    let pred = arena.integer(index);
    let filter = arena.filter(base, pred);
    let compiled = compile(arena, filter, &static_context(OptimizerOptions::default())).unwrap();
    assert_eq!(compiled.arena().kind(compiled.root()).name(), kind);
    assert_eq!(evaluate(&compiled, None), vec![ITEMS[(index - 1) as usize]]);
}

#[rstest]
fn position_range_becomes_subsequence() {
    let mut arena = ExprArena::new();
    let base = arena.global_var(items());
    let pos = arena.fn_call("position", vec![]).unwrap();
    let lo = arena.integer(2);
    let hi = arena.integer(4);
    let range = arena.range(lo, hi);
    let pred = arena.general_comparison(CompareOp::Eq, pos, range);
    let filter = arena.filter(base, pred);
    let compiled = compile(arena, filter, &static_context(OptimizerOptions::default())).unwrap();
    assert_eq!(evaluate(&compiled, None), vec![11, 12, 13]);
    let rewrites: Vec<&str> = compiled.optimizer_trace().iter().map(|t| t.rewrite).collect();
    assert!(rewrites.contains(&"integer-range-test"), "{rewrites:?}");
}

#[rstest]
fn count_compared_to_zero_becomes_exists() {
    let mut arena = ExprArena::new();
    let base = arena.global_var(items());
    let count = arena.fn_call("count", vec![base]).unwrap();
    let zero = arena.integer(0);
    let gt = arena.value_comparison(CompareOp::Gt, count, zero);
    let compiled = compile(arena, gt, &static_context(OptimizerOptions::default())).unwrap();
    let root = compiled.arena().kind(compiled.root());
    assert!(matches!(root, ExprKind::FunctionCall { function: SystemFunction::Exists, .. }), "{root:?}");
}

#[rstest]
fn sequence_ordering_uses_minimax() {
    let mut arena = ExprArena::new();
    let base = arena.global_var(items());
    let limit = arena.integer(12);
    let lt = arena.general_comparison(CompareOp::Lt, base, limit);
    let compiled = compile(arena, lt, &static_context(OptimizerOptions::default())).unwrap();
    assert!(compiled.optimizer_trace().iter().any(|t| t.rewrite == "minimax"));
    let explained = compiled.explain().to_string();
    assert!(explained.contains("name=\"min\""), "{explained}");
}

#[rstest]
fn trace_is_recorded_only_when_requested() {
    let build = || {
        let mut arena = ExprArena::new();
        let base = arena.global_var(items());
        let one = arena.integer(1);
        let filter = arena.filter(base, one);
        (arena, filter)
    };
    let (arena, root) = build();
    let traced = compile(arena, root, &static_context(OptimizerOptions::default())).unwrap();
    assert!(!traced.optimizer_trace().is_empty());

    let (arena, root) = build();
    let quiet = StaticContextBuilder::new()
        .with_variable(items(), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
        .build();
    let untraced = compile(arena, root, &quiet).unwrap();
    assert!(untraced.optimizer_trace().is_empty());
}

#[rstest]
fn early_evaluation_folds_constant_arithmetic() {
    let mut arena = ExprArena::new();
    let two = arena.integer(2);
    let three = arena.integer(3);
    let sum = arena.arithmetic(ArithOp::Plus, two, three);
    let compiled = compile(arena, sum, &StaticContext::default()).unwrap();
    assert_eq!(compiled.explain().to_string(), "<literal value=\"integer(5)\"/>\n");

    let mut arena = ExprArena::new();
    let two = arena.integer(2);
    let three = arena.integer(3);
    let sum = arena.arithmetic(ArithOp::Plus, two, three);
    let lazy = StaticContextBuilder::new()
        .with_optimizer(OptimizerOptions { early_evaluation: false, ..OptimizerOptions::default() })
        .build();
    let compiled = compile(arena, sum, &lazy).unwrap();
    assert_eq!(compiled.explain().name, "arith");
}
