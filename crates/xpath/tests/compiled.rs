use std::sync::Arc;

use rstest::{fixture, rstest};
use xpath_core::compiler::expr::{Axis, Quantifier};
use xpath_core::compiler::{
    ArithOp, CompareOp, CompilerHooks, ExprKind, ExpressionCompilerHook, StreamingAdjunctHook,
};
use xpath_core::engine::runtime::OptimizerOptions;
use xpath_core::types::{Cardinality, ItemType, NodeTest, SequenceType};
use xpath_core::{
    CompiledXPath, DynamicContextBuilder, ExprArena, ExpandedName, SimpleNode, StaticContext, StaticContextBuilder,
    XdmAtomicValue, XdmItem, compile, doc, elem,
};

#[derive(Debug)]
struct ArithmeticCompiler;

impl ExpressionCompilerHook for ArithmeticCompiler {
    fn handles(&self, kind: &ExprKind) -> bool {
        matches!(kind, ExprKind::Arithmetic { .. })
    }
}

#[derive(Debug)]
struct StepStreamer;

impl StreamingAdjunctHook for StepStreamer {
    fn handles(&self, kind: &ExprKind) -> bool {
        matches!(kind, ExprKind::Axis { .. } | ExprKind::Slash { .. })
    }
}

#[fixture]
fn hooked() -> StaticContext {
    StaticContextBuilder::new()
        .with_variable(ExpandedName::local("x"), SequenceType::new(ItemType::INTEGER, Cardinality::EXACTLY_ONE))
        .with_hooks(
            CompilerHooks::default()
                .with_expression_compiler(Arc::new(ArithmeticCompiler))
                .with_streaming_adjunct(Arc::new(StepStreamer)),
        )
        .build()
}

fn x_plus_one(static_ctx: &StaticContext) -> CompiledXPath {
    let mut arena = ExprArena::new();
    let x = arena.global_var(ExpandedName::local("x"));
    let one = arena.integer(1);
    let sum = arena.arithmetic(ArithOp::Plus, x, one);
    compile(arena, sum, static_ctx).unwrap()
}

#[rstest]
fn hooks_are_consulted_per_node_kind(hooked: StaticContext) {
    let compiled = x_plus_one(&hooked);
    let root = compiled.root();
    assert!(compiled.expression_compiler(root).is_some());
    assert!(compiled.streaming_adjunct(root).is_none());

    let operands = compiled.arena().children(root);
    assert!(operands.iter().all(|c| compiled.expression_compiler(*c).is_none()));
}

#[rstest]
fn hooks_absent_by_default() {
    let static_ctx = StaticContextBuilder::new()
        .with_variable(ExpandedName::local("x"), SequenceType::new(ItemType::INTEGER, Cardinality::EXACTLY_ONE))
        .build();
    let compiled = x_plus_one(&static_ctx);
    assert!(compiled.expression_compiler(compiled.root()).is_none());
}

#[rstest]
fn explain_shows_resolved_operators(hooked: StaticContext) {
    let compiled = x_plus_one(&hooked);
    let tree = compiled.explain();
    assert_eq!(tree.name, "arith");
    assert_eq!(tree.attribute("op"), Some("+"));
    assert!(tree.attribute("calculator").is_some());
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].attribute("name"), Some("$x"));
}

#[rstest]
fn compiled_expression_is_shared_across_evaluations(hooked: StaticContext) {
    let compiled = x_plus_one(&hooked);
    let copy = compiled.clone();
    for (x, expected) in [(1, 2), (41, 42)] {
        let dynamic = DynamicContextBuilder::<SimpleNode>::new()
            .with_variable(ExpandedName::local("x"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(x))])
            .build();
        let expected = vec![XdmItem::Atomic(XdmAtomicValue::Integer(expected))];
        assert_eq!(compiled.evaluate(&dynamic).unwrap(), expected);
        assert_eq!(copy.evaluate(&dynamic).unwrap(), expected);
    }
}

#[rstest]
fn loop_invariant_is_lifted_out_of_a_for() {
    let build = || {
        let mut arena = ExprArena::new();
        let i = arena.declare_var(ExpandedName::local("i"));
        let seq = arena.range_of(1, 3);
        let i_ref = arena.var_ref(i);
        let items = arena.global_var(ExpandedName::local("items"));
        let count = arena.fn_call("count", vec![items]).unwrap();
        let body = arena.arithmetic(ArithOp::Times, i_ref, count);
        let for_expr = arena.for_expr(i, seq, body);
        (arena, for_expr)
    };
    let declare = |options: OptimizerOptions| {
        StaticContextBuilder::new()
            .with_variable(ExpandedName::local("items"), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
            .with_optimizer(options)
            .with_trace_optimizer_decisions(true)
            .build()
    };
    let dynamic = DynamicContextBuilder::<SimpleNode>::new()
        .with_variable(
            ExpandedName::local("items"),
            vec![XdmItem::Atomic(XdmAtomicValue::Integer(5)), XdmItem::Atomic(XdmAtomicValue::Integer(6))],
        )
        .build();
    let expected: Vec<XdmItem<SimpleNode>> =
        [2, 4, 6].into_iter().map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(i))).collect();

    let (arena, root) = build();
    let lifted = compile(arena, root, &declare(OptimizerOptions::default())).unwrap();
    assert!(lifted.optimizer_trace().iter().any(|t| t.rewrite == "loop-lifting"));
    assert_eq!(lifted.explain().name, "let");
    assert_eq!(lifted.evaluate(&dynamic).unwrap(), expected);

    let (arena, root) = build();
    let plain = compile(arena, root, &declare(OptimizerOptions { loop_lifting: false, ..OptimizerOptions::default() }))
        .unwrap();
    assert_eq!(plain.explain().name, "for");
    assert_eq!(plain.evaluate(&dynamic).unwrap(), expected);
}

#[rstest]
#[case(Quantifier::Some, true)]
#[case(Quantifier::Every, false)]
fn quantified_over_children(#[case] quantifier: Quantifier, #[case] expected: bool) {
    let document = doc()
        .child(elem("list").child(elem("item")).child(elem("other")).child(elem("item")))
        .build();
    let mut arena = ExprArena::new();
    let v = arena.declare_var(ExpandedName::local("v"));
    let start = arena.root();
    let list = arena.axis(Axis::Child, NodeTest::element("list"));
    let any = arena.axis(Axis::Child, NodeTest::any_element());
    let children = arena.path(start, vec![list, any]);
    let v_ref = arena.var_ref(v);
    let self_item = arena.axis(Axis::SelfAxis, NodeTest::element("item"));
    let is_item = arena.slash(v_ref, self_item);
    let test = arena.fn_call("exists", vec![is_item]).unwrap();
    let q = arena.quantified(quantifier, v, children, test);
    let compiled = compile(arena, q, &StaticContext::default()).unwrap();
    let dynamic = DynamicContextBuilder::new().with_context_item(document).build();
    assert_eq!(compiled.effective_boolean_value(&dynamic).unwrap(), expected);
}

#[rstest]
fn value_comparison_of_empty_is_empty() {
    let mut arena = ExprArena::new();
    let empty = arena.empty_sequence();
    let one = arena.integer(1);
    let eq = arena.value_comparison(CompareOp::Eq, empty, one);
    let compiled = compile(arena, eq, &StaticContext::default()).unwrap();
    assert!(compiled.evaluate(&DynamicContextBuilder::<SimpleNode>::new().build()).unwrap().is_empty());
}
